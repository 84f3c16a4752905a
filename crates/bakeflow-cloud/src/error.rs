//! Cloud layer error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Timeout while connecting to {addr}:{port}")]
    ConnectionTimeout { addr: String, port: u16 },

    #[error("No state found at {}, was this instance created?", path.display())]
    StateNotFound { path: PathBuf },

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
