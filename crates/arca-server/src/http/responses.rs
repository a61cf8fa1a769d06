//! HTTP request and response types.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/certificado`.
///
/// Every field is optional at this layer so that absent and blank values are
/// reported the same way.
#[derive(Debug, Default, Deserialize)]
pub struct CertificateRequest {
    /// Taxpayer CUIT.
    #[serde(rename = "CUIT", default)]
    pub cuit: Option<String>,

    /// CUIL used to log in.
    #[serde(rename = "CUIL", default)]
    pub cuil: Option<String>,

    /// Fiscal password.
    #[serde(default)]
    pub clave: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
