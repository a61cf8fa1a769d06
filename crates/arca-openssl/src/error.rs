//! Error types for the OpenSSL toolkit.

use std::path::PathBuf;

use arca_core::{CryptoStage, EnrollError};
use thiserror::Error;

/// Errors that can occur while driving the `openssl` executable.
#[derive(Debug, Error)]
pub enum OpensslError {
    /// Failed to spawn the openssl process.
    #[error("failed to spawn '{program}' for {stage}: {source}")]
    Spawn {
        stage: CryptoStage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// openssl exited with a non-zero status.
    #[error("openssl {stage} exited with code {exit_code:?}: {stderr}")]
    Exit {
        stage: CryptoStage,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// openssl did not finish within the configured timeout.
    #[error("openssl {stage} timed out after {secs}s")]
    Timeout { stage: CryptoStage, secs: u64 },

    /// An input file required by the stage does not exist.
    #[error("missing input for {stage}: {}", path.display())]
    MissingInput { stage: CryptoStage, path: PathBuf },

    /// A produced artifact could not be read or parsed.
    #[error("invalid {stage} artifact: {message}")]
    InvalidArtifact { stage: CryptoStage, message: String },
}

impl OpensslError {
    /// Stage that failed.
    pub fn stage(&self) -> CryptoStage {
        match self {
            Self::Spawn { stage, .. }
            | Self::Exit { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::MissingInput { stage, .. }
            | Self::InvalidArtifact { stage, .. } => *stage,
        }
    }

    /// Exit code of the process, when it exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

impl From<OpensslError> for EnrollError {
    fn from(err: OpensslError) -> Self {
        EnrollError::CryptoTool {
            stage: err.stage(),
            exit_code: err.exit_code(),
            message: err.to_string(),
        }
    }
}
