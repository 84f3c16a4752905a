//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error loading {}: not found", path.display())]
    NotFound { path: PathBuf },

    #[error("Error loading {}: {message}", path.display())]
    Template { path: PathBuf, message: String },

    #[error("Error loading {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Error validating configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation(vec![message.into()])
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
