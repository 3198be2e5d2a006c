use crate::archive::PatternError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid archive pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid SHA-256 length: expected 32 bytes, got {0}")]
    InvalidHash(usize),

    #[error("No attached volume contains '{0}'")]
    VolumeNotAttached(String),

    #[error("Archive #{0} does not exist")]
    UnknownArchive(i64),

    #[error("{0}")]
    Other(String),
}
