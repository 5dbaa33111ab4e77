// error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by loaders, configuration checks and the writers.
///
/// Degenerate statistics (zero genotype variance, untestable configurations)
/// are never errors: they travel as 0 / +inf / NaN sentinels.
#[derive(Error, Debug)]
pub enum BmaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {} at line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Distribution error: {message}")]
    Distribution { message: String },
}

pub type Result<T> = std::result::Result<T, BmaError>;

impl BmaError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn distribution(message: impl Into<String>) -> Self {
        Self::Distribution {
            message: message.into(),
        }
    }
}
