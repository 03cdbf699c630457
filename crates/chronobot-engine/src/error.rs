use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] chronobot_store::StoreError),
}
