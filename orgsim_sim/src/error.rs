//! Startup and configuration errors for the harness.

use orgsim_core::TranscriptError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    
    #[error("Malformed transcript {path}: {source}")]
    Transcript {
        path: PathBuf,
        #[source]
        source: TranscriptError,
    },
    
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
    
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SimError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
    
    pub fn transcript(path: impl Into<PathBuf>, source: TranscriptError) -> Self {
        Self::Transcript {
            path: path.into(),
            source,
        }
    }
}
