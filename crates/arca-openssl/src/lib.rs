//! OpenSSL toolkit for ARCA certificate enrollment
//!
//! This crate drives the external `openssl` executable to produce the local
//! crypto artifacts of an enrollment: an RSA key, a CSR and the final PKCS#12
//! bundle. Every invocation is asynchronous and bounded by a timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use arca_core::Identity;
//! use arca_openssl::{OpensslToolkit, SubjectFields};
//!
//! async fn make_csr() -> Result<(), Box<dyn std::error::Error>> {
//!     let toolkit = OpensslToolkit::new("openssl");
//!     let identity = Identity::from_display_name("PEREZ JUAN").ok_or("no identity")?;
//!
//!     let key = Path::new("csrs/MiClavePrivada_PEREZ_JUAN_2025.key");
//!     let csr = Path::new("csrs/MiPedidoCSR_PEREZ_JUAN_2025.csr");
//!     toolkit.generate_key_pair(key).await?;
//!     toolkit
//!         .generate_csr(key, &SubjectFields::for_taxpayer(&identity, "20111111111"), csr)
//!         .await?;
//!     toolkit.verify_csr_matches_key(csr, key).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod inspect;
mod subject;
mod toolkit;

pub use error::OpensslError;
pub use inspect::{
    certificate_public_key_der, csr_public_key_der, normalize_certificate, summarize_certificate,
    CertificateSummary,
};
pub use subject::SubjectFields;
pub use toolkit::{OpensslToolkit, KEY_BITS};
