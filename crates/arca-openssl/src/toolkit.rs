//! OpenSSL toolkit for key, CSR and PKCS#12 generation.
//!
//! Every operation spawns the `openssl` executable with an explicit argument
//! vector (no shell) and waits for it under a bounded timeout. The child is
//! killed if the wait is abandoned.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use arca_core::CryptoStage;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::OpensslError;
use crate::inspect::csr_public_key_der;
use crate::subject::SubjectFields;

/// RSA modulus size for generated keys.
pub const KEY_BITS: u32 = 2048;

/// Driver for the external `openssl` executable.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::time::Duration;
/// use arca_openssl::OpensslToolkit;
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let toolkit = OpensslToolkit::new("openssl").with_timeout(Duration::from_secs(30));
///     toolkit.generate_key_pair(Path::new("csrs/example.key")).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OpensslToolkit {
    /// Path to the openssl executable.
    openssl_path: String,

    /// Upper bound for a single invocation.
    timeout: Duration,
}

impl OpensslToolkit {
    /// Create a toolkit for the given executable.
    ///
    /// The path can be just "openssl" to use PATH lookup, or a full path.
    pub fn new(openssl_path: impl Into<String>) -> Self {
        Self {
            openssl_path: openssl_path.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the executable this toolkit runs.
    pub fn openssl_path(&self) -> &str {
        &self.openssl_path
    }

    /// Generate a 2048-bit RSA private key at `key_path`.
    pub async fn generate_key_pair(&self, key_path: &Path) -> Result<(), OpensslError> {
        let bits = KEY_BITS.to_string();
        self.run(
            CryptoStage::KeyPair,
            &[
                OsStr::new("genrsa"),
                OsStr::new("-out"),
                key_path.as_os_str(),
                OsStr::new(&bits),
            ],
        )
        .await?;
        Ok(())
    }

    /// Generate a CSR for `key_path` with the given subject.
    ///
    /// Returns the path the CSR was written to.
    pub async fn generate_csr(
        &self,
        key_path: &Path,
        subject: &SubjectFields,
        csr_path: &Path,
    ) -> Result<PathBuf, OpensslError> {
        require_file(CryptoStage::Csr, key_path)?;

        let subj = subject.to_openssl_subject();
        self.run(
            CryptoStage::Csr,
            &[
                OsStr::new("req"),
                OsStr::new("-new"),
                // Subject is UTF-8; without this openssl reads it byte by byte.
                OsStr::new("-utf8"),
                OsStr::new("-key"),
                key_path.as_os_str(),
                OsStr::new("-subj"),
                OsStr::new(&subj),
                OsStr::new("-out"),
                csr_path.as_os_str(),
            ],
        )
        .await?;
        Ok(csr_path.to_path_buf())
    }

    /// DER-encoded SubjectPublicKeyInfo of the key at `key_path`.
    pub async fn public_key_der(&self, key_path: &Path) -> Result<Vec<u8>, OpensslError> {
        require_file(CryptoStage::PublicKey, key_path)?;

        self.run(
            CryptoStage::PublicKey,
            &[
                OsStr::new("pkey"),
                OsStr::new("-in"),
                key_path.as_os_str(),
                OsStr::new("-pubout"),
                OsStr::new("-outform"),
                OsStr::new("DER"),
            ],
        )
        .await
    }

    /// Check that the CSR carries the public half of the key.
    pub async fn verify_csr_matches_key(
        &self,
        csr_path: &Path,
        key_path: &Path,
    ) -> Result<(), OpensslError> {
        require_file(CryptoStage::Csr, csr_path)?;

        let csr_pem = tokio::fs::read_to_string(csr_path).await.map_err(|e| {
            OpensslError::InvalidArtifact {
                stage: CryptoStage::Csr,
                message: format!("failed to read {}: {}", csr_path.display(), e),
            }
        })?;
        let from_csr = csr_public_key_der(&csr_pem)?;
        let from_key = self.public_key_der(key_path).await?;

        if from_csr != from_key {
            return Err(OpensslError::InvalidArtifact {
                stage: CryptoStage::Csr,
                message: "CSR public key does not match the private key".to_string(),
            });
        }

        debug!(csr = %csr_path.display(), "CSR public key matches private key");
        Ok(())
    }

    /// Export key + certificate as a PKCS#12 bundle with an empty password.
    pub async fn bundle_pkcs12(
        &self,
        key_path: &Path,
        crt_path: &Path,
        out_path: &Path,
    ) -> Result<(), OpensslError> {
        require_file(CryptoStage::Bundle, key_path)?;
        require_file(CryptoStage::Bundle, crt_path)?;

        self.run(
            CryptoStage::Bundle,
            &[
                OsStr::new("pkcs12"),
                OsStr::new("-export"),
                OsStr::new("-out"),
                out_path.as_os_str(),
                OsStr::new("-inkey"),
                key_path.as_os_str(),
                OsStr::new("-in"),
                crt_path.as_os_str(),
                OsStr::new("-passout"),
                OsStr::new("pass:"),
            ],
        )
        .await?;
        Ok(())
    }

    /// Run openssl with `args` and return its stdout.
    async fn run(&self, stage: CryptoStage, args: &[&OsStr]) -> Result<Vec<u8>, OpensslError> {
        info!(
            openssl = %self.openssl_path,
            stage = %stage,
            command = ?args.first(),
            "Running openssl"
        );

        let mut cmd = Command::new(&self.openssl_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                error!(error = %source, stage = %stage, "Failed to spawn openssl");
                return Err(OpensslError::Spawn {
                    stage,
                    program: self.openssl_path.clone(),
                    source,
                });
            }
            Err(_) => {
                error!(stage = %stage, timeout_secs = self.timeout.as_secs(), "openssl timed out");
                return Err(OpensslError::Timeout {
                    stage,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code();
        info!(stage = %stage, exit_code = ?exit_code, success = output.status.success(), "openssl exited");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OpensslError::Exit {
                stage,
                exit_code,
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

impl Default for OpensslToolkit {
    fn default() -> Self {
        Self::new("openssl")
    }
}

fn require_file(stage: CryptoStage, path: &Path) -> Result<(), OpensslError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(OpensslError::MissingInput {
            stage,
            path: path.to_path_buf(),
        })
    }
}
