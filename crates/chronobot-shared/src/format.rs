//! Human-readable duration formatting for command responses.

use std::time::Duration;

/// Format a duration as `"[D days ][H hours ]M minutes S seconds"`,
/// singularizing each unit as needed.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if days > 0 {
        push_unit(&mut out, days, "day");
    }
    if hours > 0 || days > 0 {
        push_unit(&mut out, hours, "hour");
    }
    push_unit(&mut out, minutes, "minute");
    push_unit(&mut out, seconds, "second");

    out.trim_end().to_string()
}

fn push_unit(out: &mut String, value: u64, unit: &str) {
    let plural = if value == 1 { "" } else { "s" };
    out.push_str(&format!("{value} {unit}{plural} "));
}
