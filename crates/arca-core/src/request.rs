//! Enrollment request and result records.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::alias::Alias;
use crate::artifacts::ArtifactPaths;
use crate::error::EnrollError;
use crate::identity::Identity;

/// Message returned with every successful enrollment.
pub const SUCCESS_MESSAGE: &str = "CSR generado correctamente";

/// Caller-supplied credentials for one enrollment.
///
/// The secret is held in a [`SecretString`] so `Debug` output never reveals
/// it. The request is consumed by the orchestrator.
#[derive(Debug)]
pub struct EnrollmentRequest {
    /// CUIT of the taxpayer the certificate is issued for.
    pub tax_id: String,

    /// CUIL used to log in.
    pub user_id: String,

    /// Fiscal password.
    pub secret: SecretString,
}

impl EnrollmentRequest {
    /// Build a request, rejecting absent or blank fields.
    ///
    /// The error lists every missing field name as the HTTP contract names it.
    pub fn new(
        tax_id: Option<String>,
        user_id: Option<String>,
        secret: Option<String>,
    ) -> Result<Self, EnrollError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        match (present(tax_id), present(user_id), present(secret)) {
            (Some(tax_id), Some(user_id), Some(secret)) => Ok(Self {
                tax_id: tax_id.trim().to_string(),
                user_id: user_id.trim().to_string(),
                secret: SecretString::from(secret),
            }),
            _ => Err(EnrollError::Validation("CUIT, CUIL, clave".to_string())),
        }
    }

    /// Borrow the secret for the single place it is typed into the portal.
    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Outcome of a completed enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentResult {
    #[serde(rename = "razonSocial", serialize_with = "serialize_display_name")]
    pub identity: Identity,

    #[serde(flatten)]
    pub paths: ArtifactPaths,

    pub alias: Alias,

    #[serde(rename = "mensaje")]
    pub message: String,
}

impl EnrollmentResult {
    /// Build a successful result.
    pub fn success(identity: Identity, paths: ArtifactPaths, alias: Alias) -> Self {
        Self {
            identity,
            paths,
            alias,
            message: SUCCESS_MESSAGE.to_string(),
        }
    }
}

fn serialize_display_name<S: serde::Serializer>(
    identity: &Identity,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(identity.display_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_fields_are_rejected() {
        let err = EnrollmentRequest::new(Some("20111111111".into()), None, Some("x".into()))
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Faltan parámetros: CUIT, CUIL, clave");
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        let result = EnrollmentRequest::new(
            Some("20111111111".into()),
            Some("20111111111".into()),
            Some("   ".into()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let request = EnrollmentRequest::new(
            Some("20111111111".into()),
            Some("20111111111".into()),
            Some("hunter2".into()),
        )
        .unwrap();
        let debug = format!("{:?}", request);
        assert!(!debug.contains("hunter2"));
        assert_eq!(request.expose_secret(), "hunter2");
    }

    #[test]
    fn test_result_uses_portal_field_names() {
        let identity = Identity::from_display_name("PEREZ JUAN").unwrap();
        let paths = ArtifactPaths::derive(Path::new("csrs"), &identity, 2025);
        let result = EnrollmentResult::success(identity, paths, Alias::from("CERTIFICADO_X_1"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["razonSocial"], "PEREZ JUAN");
        assert_eq!(json["clavePrivada"], "csrs/MiClavePrivada_PEREZ_JUAN_2025.key");
        assert_eq!(json["csrPath"], "csrs/MiPedidoCSR_PEREZ_JUAN_2025.csr");
        assert_eq!(json["crtPath"], "csrs/CertificadoDN_PEREZ_JUAN_2025.crt");
        assert_eq!(json["pfxPath"], "csrs/Certificado_PEREZ_JUAN_2025.pfx");
        assert_eq!(json["alias"], "CERTIFICADO_X_1");
        assert_eq!(json["mensaje"], SUCCESS_MESSAGE);
    }
}
