//! HTTP server for certificate enrollment.
//!
//! Provides endpoints for:
//! - Certificate enrollment (`POST /api/certificado`)
//! - Banner (`/`) and health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

pub use handlers::BANNER;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // API routes
        .route("/api/certificado", post(handlers::issue_certificate))
        // Observability routes
        .route("/", get(handlers::banner))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use arca_core::SUCCESS_MESSAGE;
    use arca_portal::testing::{PortalScript, ScriptedFactory};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::util::ServiceExt;

    use crate::service::fixtures::{openssl_available, self_signing_portal, service};

    const SCENARIO_BODY: &str = r#"{"CUIT":"20111111111","CUIL":"20111111111","clave":"secret"}"#;

    fn app(script: PortalScript, work_dir: &Path) -> (Router, Arc<AppState>, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new(script));
        let state = AppState::new(service(factory.clone(), work_dir));
        (create_router(state.clone()), state, factory)
    }

    fn post_certificate(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/certificado")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file())
                    .count()
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_banner() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, _) = app(PortalScript::default(), dir.path());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], BANNER.as_bytes());
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, _) = app(PortalScript::default(), dir.path());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_successful_enrollment() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let script = PortalScript {
            certificate: self_signing_portal(),
            ..PortalScript::default()
        };
        let (app, state, factory) = app(script, dir.path());

        let response = app.oneshot(post_certificate(SCENARIO_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["mensaje"], SUCCESS_MESSAGE);
        assert_eq!(body["razonSocial"], "PEREZ JUAN");
        assert!(body["alias"]
            .as_str()
            .unwrap()
            .starts_with("CERTIFICADO_PEREZ_JUAN_"));
        for field in ["clavePrivada", "csrPath", "crtPath", "pfxPath"] {
            let path = body[field].as_str().unwrap();
            assert!(Path::new(path).is_file(), "{field} missing at {path}");
        }
        assert_eq!(file_count(dir.path()), 4);

        assert!(factory.sessions()[0].is_closed());
        assert_eq!(state.metrics.completed(), 1);
        assert_eq!(state.metrics.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_identity_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = PortalScript {
            identity: None,
            ..PortalScript::default()
        };
        let (app, state, factory) = app(script, dir.path());

        let response = app.oneshot(post_certificate(SCENARIO_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        let error = body["error"].as_str().unwrap().to_lowercase();
        assert!(error.contains("authentication"));
        assert_eq!(file_count(dir.path()), 0);
        assert!(factory.sessions()[0].is_closed());
        assert_eq!(state.metrics.failed("authentication"), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state, factory) = app(PortalScript::default(), dir.path());

        let response = app
            .oneshot(post_certificate(r#"{"CUIT":"20111111111","clave":"  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Faltan parámetros: CUIT, CUIL, clave"
        );

        // No browser was launched.
        assert!(factory.sessions().is_empty());
        assert_eq!(state.metrics.failed("validation"), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, factory) = app(PortalScript::default(), dir.path());

        let response = app.oneshot(post_certificate("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
        assert!(factory.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, _) = app(PortalScript::default(), dir.path());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("arca_enrollments_in_flight 0"));
    }
}
