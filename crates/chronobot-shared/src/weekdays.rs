//! A set of weekdays an alarm repeats on.
//!
//! Serialized as ISO weekday numbers (1 = Monday .. 7 = Sunday), the same
//! shape the snapshot's `repeating_days` arrays use.

use chrono::Weekday;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut set = Self::empty();
        for n in 1..=7 {
            if let Some(day) = weekday_from_iso(n) {
                set.insert(day);
            }
        }
        set
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    /// Returns `true` if the day was not already present.
    pub fn insert(&mut self, day: Weekday) -> bool {
        let bit = Self::bit(day);
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Returns `true` if the day was present.
    pub fn remove(&mut self, day: Weekday) -> bool {
        let bit = Self::bit(day);
        let removed = self.0 & bit != 0;
        self.0 &= !bit;
        removed
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in ISO order, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        (1..=7).filter_map(weekday_from_iso).filter(|d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

/// ISO weekday number (1 = Monday .. 7 = Sunday).
pub fn weekday_from_iso(n: u8) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_to_iso(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8 + 1
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let days: Vec<u8> = self.iter().map(weekday_to_iso).collect();
        days.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let days = Vec::<u8>::deserialize(deserializer)?;
        let mut set = WeekdaySet::empty();
        for n in days {
            let day = weekday_from_iso(n)
                .ok_or_else(|| D::Error::custom(format!("invalid ISO weekday number: {n}")))?;
            set.insert(day);
        }
        Ok(set)
    }
}
