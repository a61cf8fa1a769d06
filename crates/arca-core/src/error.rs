//! Core enrollment errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of the external crypto toolkit that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoStage {
    /// RSA key pair generation.
    KeyPair,
    /// Certificate signing request generation.
    Csr,
    /// Public key extraction used to cross-check the CSR.
    PublicKey,
    /// PKCS#12 export of key + certificate.
    Bundle,
}

impl CryptoStage {
    /// Stable lowercase name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyPair => "key_pair",
            Self::Csr => "csr",
            Self::PublicKey => "public_key",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for CryptoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort an enrollment.
///
/// Every variant is terminal for the request that produced it; the message
/// is reported verbatim to the caller.
#[derive(Debug, Error)]
pub enum EnrollError {
    /// Required request fields are missing.
    #[error("Faltan parámetros: {0}")]
    Validation(String),

    /// The portal did not yield an account identity after login.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The certificate administration surface could not be reached.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The certificate download never started or never completed.
    #[error("Download failed: {0}")]
    Download(String),

    /// The external crypto toolkit failed.
    #[error("Crypto tool failed at stage '{stage}' (exit code {}): {message}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    CryptoTool {
        stage: CryptoStage,
        exit_code: Option<i32>,
        message: String,
    },

    /// The browser driver failed (launch, protocol or element errors).
    #[error("Browser error: {0}")]
    Browser(String),

    /// Filesystem error while preparing or writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnrollError {
    /// Stable lowercase tag for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authentication(_) => "authentication",
            Self::Navigation(_) => "navigation",
            Self::Download(_) => "download",
            Self::CryptoTool { .. } => "crypto_tool",
            Self::Browser(_) => "browser",
            Self::Io(_) => "io",
        }
    }

    /// Returns true if the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_tool_message_includes_stage_and_code() {
        let err = EnrollError::CryptoTool {
            stage: CryptoStage::Bundle,
            exit_code: Some(1),
            message: "unable to load certificate".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bundle"));
        assert!(msg.contains("exit code 1"));
        assert_eq!(err.kind(), "crypto_tool");
    }

    #[test]
    fn test_crypto_tool_without_exit_code() {
        let err = EnrollError::CryptoTool {
            stage: CryptoStage::KeyPair,
            exit_code: None,
            message: "timed out".to_string(),
        };
        assert!(err.to_string().contains("exit code none"));
    }

    #[test]
    fn test_only_validation_is_client_error() {
        assert!(EnrollError::Validation("CUIT".into()).is_client_error());
        assert!(!EnrollError::Authentication("x".into()).is_client_error());
        assert!(!EnrollError::Navigation("x".into()).is_client_error());
    }
}
