//! Deterministic artifact paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Kind of artifact produced by an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    PrivateKey,
    Csr,
    Certificate,
    Bundle,
}

impl ArtifactKind {
    /// Filename prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::PrivateKey => "MiClavePrivada",
            Self::Csr => "MiPedidoCSR",
            Self::Certificate => "CertificadoDN",
            Self::Bundle => "Certificado",
        }
    }

    /// File extension for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::PrivateKey => "key",
            Self::Csr => "csr",
            Self::Certificate => "crt",
            Self::Bundle => "pfx",
        }
    }

    /// `<Kind>_<identity>_<year>.<ext>`
    pub fn file_name(&self, identity: &Identity, year: i32) -> String {
        format!(
            "{}_{}_{}.{}",
            self.prefix(),
            identity.file_stem(),
            year,
            self.extension()
        )
    }
}

/// The four files an enrollment writes.
///
/// Paths depend only on the working directory, the identity and the year, so
/// a second run for the same identity in the same year overwrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    #[serde(rename = "clavePrivada")]
    pub private_key_path: PathBuf,
    pub csr_path: PathBuf,
    pub crt_path: PathBuf,
    pub pfx_path: PathBuf,
}

impl ArtifactPaths {
    /// Derive the artifact paths for an identity and year.
    pub fn derive(work_dir: &Path, identity: &Identity, year: i32) -> Self {
        let path = |kind: ArtifactKind| work_dir.join(kind.file_name(identity, year));
        Self {
            private_key_path: path(ArtifactKind::PrivateKey),
            csr_path: path(ArtifactKind::Csr),
            crt_path: path(ArtifactKind::Certificate),
            pfx_path: path(ArtifactKind::Bundle),
        }
    }

    /// All four paths, key first.
    pub fn all(&self) -> [&Path; 4] {
        [
            &self.private_key_path,
            &self.csr_path,
            &self.crt_path,
            &self.pfx_path,
        ]
    }
}
