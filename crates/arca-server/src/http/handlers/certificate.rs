//! Certificate enrollment handler.

use std::sync::Arc;

use arca_core::EnrollmentRequest;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::http::responses::{CertificateRequest, ErrorResponse};
use crate::state::AppState;

/// Certificate enrollment endpoint.
///
/// Logs into the portal with the caller's credentials, registers a new CSR
/// and returns the paths of the key, CSR, certificate and PKCS#12 bundle.
pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CertificateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected malformed request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let request = match EnrollmentRequest::new(body.cuit, body.cuil, body.clave) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected incomplete request");
            state.metrics.record_failure(&e);
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    info!(
        tax_id = %request.tax_id,
        user_id = %request.user_id,
        "Certificate requested"
    );

    let _in_flight = state.metrics.start();
    match state.service.enroll(&request).await {
        Ok(result) => {
            state.metrics.record_success();
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Certificate request failed");
            state.metrics.record_failure(&e);
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
