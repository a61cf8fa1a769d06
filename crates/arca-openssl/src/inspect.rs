//! Parsing helpers for generated and downloaded artifacts.
//!
//! Uses pem to unwrap armor and x509-parser to read the DER structures.

use arca_core::CryptoStage;
use x509_parser::prelude::*;

use crate::error::OpensslError;

/// Summary of an issued certificate, for logging.
#[derive(Debug, Clone)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    /// Expiry as a Unix timestamp.
    pub not_after: i64,
}

/// Extract the DER SubjectPublicKeyInfo embedded in a PEM CSR.
pub fn csr_public_key_der(csr_pem: &str) -> Result<Vec<u8>, OpensslError> {
    let invalid = |message: String| OpensslError::InvalidArtifact {
        stage: CryptoStage::Csr,
        message,
    };

    let pem = ::pem::parse(csr_pem).map_err(|e| invalid(e.to_string()))?;
    let (_, csr) = X509CertificationRequest::from_der(pem.contents())
        .map_err(|e| invalid(format!("failed to parse CSR: {}", e)))?;

    Ok(csr.certification_request_info.subject_pki.raw.to_vec())
}

/// Return the certificate as PEM, re-armoring a DER download.
pub fn normalize_certificate(bytes: &[u8]) -> Result<Vec<u8>, OpensslError> {
    let invalid = |message: String| OpensslError::InvalidArtifact {
        stage: CryptoStage::Bundle,
        message,
    };

    if looks_like_pem(bytes) {
        let pem = ::pem::parse(bytes).map_err(|e| invalid(e.to_string()))?;
        if pem.tag() != "CERTIFICATE" {
            return Err(invalid(format!("expected CERTIFICATE, got {}", pem.tag())));
        }
        return Ok(bytes.to_vec());
    }

    parse_x509_certificate(bytes)
        .map_err(|e| invalid(format!("downloaded file is not a certificate: {}", e)))?;

    let pem = ::pem::Pem::new("CERTIFICATE", bytes.to_vec());
    Ok(::pem::encode(&pem).into_bytes())
}

/// Extract the DER SubjectPublicKeyInfo of a PEM certificate.
pub fn certificate_public_key_der(pem_bytes: &[u8]) -> Result<Vec<u8>, OpensslError> {
    let invalid = |message: String| OpensslError::InvalidArtifact {
        stage: CryptoStage::Bundle,
        message,
    };

    let pem = ::pem::parse(pem_bytes).map_err(|e| invalid(e.to_string()))?;
    let (_, cert) = parse_x509_certificate(pem.contents())
        .map_err(|e| invalid(format!("failed to parse certificate: {}", e)))?;

    Ok(cert.public_key().raw.to_vec())
}

/// Summarize a PEM certificate.
pub fn summarize_certificate(pem_bytes: &[u8]) -> Result<CertificateSummary, OpensslError> {
    let invalid = |message: String| OpensslError::InvalidArtifact {
        stage: CryptoStage::Bundle,
        message,
    };

    let pem = ::pem::parse(pem_bytes).map_err(|e| invalid(e.to_string()))?;
    let (_, cert) = parse_x509_certificate(pem.contents())
        .map_err(|e| invalid(format!("failed to parse certificate: {}", e)))?;

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_after: cert.validity().not_after.timestamp(),
    })
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN")
}
