use crate::cluster::ClusterError;
use crate::config::ConfigError;
use crate::confirm::{BackendError, ConfirmError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Confirm(#[from] ConfirmError),
    #[error("{0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Cluster(#[from] ClusterError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("terminal runtime error: {0}")]
    Runtime(String),
    #[error("logging initialization failed: {0}")]
    Logging(String),
}
