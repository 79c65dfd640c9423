// Error types for set cover maintenance
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
    #[error("Invalid call: {0}")]
    InvalidCall(String),
    #[error("Empty input: {0}")]
    EmptyInput(String),
    #[error("Requested {requested} starting rules, but only {available} are available")]
    OutOfRange { requested: usize, available: usize },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoverError>;

// Helper conversions
impl From<std::io::Error> for CoverError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}
impl From<config::ConfigError> for CoverError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for CoverError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}
