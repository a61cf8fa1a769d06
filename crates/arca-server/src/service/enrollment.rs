//! Enrollment orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arca_core::{ArtifactPaths, EnrollError, EnrollmentRequest, EnrollmentResult};
use arca_openssl::{
    certificate_public_key_der, normalize_certificate, summarize_certificate, OpensslToolkit,
    SubjectFields,
};
use arca_portal::{
    authenticate, download_certificate, reach_admin_surface, submit_csr, BrowserSession,
    NavigationTimeouts, PortalLayout, SessionFactory, StepTimeouts,
};
use chrono::{Datelike, Local};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Config;
use crate::service::locks::IdentityLocks;

/// Runs the full enrollment workflow, one browser session per request.
pub struct EnrollmentService {
    sessions: Arc<dyn SessionFactory>,
    toolkit: OpensslToolkit,
    work_dir: PathBuf,
    portal_url: String,
    layout: PortalLayout,
    navigation: NavigationTimeouts,
    steps: StepTimeouts,
    permits: Semaphore,
    identity_locks: IdentityLocks,
}

impl EnrollmentService {
    /// Create a service from configuration and a session factory.
    pub fn new(sessions: Arc<dyn SessionFactory>, config: &Config) -> Self {
        let toolkit =
            OpensslToolkit::new(config.openssl_path.clone()).with_timeout(config.tool_timeout());
        Self {
            sessions,
            toolkit,
            work_dir: config.work_dir.clone(),
            portal_url: config.portal_url.clone(),
            layout: PortalLayout::default(),
            navigation: NavigationTimeouts::default(),
            steps: StepTimeouts::default(),
            permits: Semaphore::new(config.max_concurrent_enrollments.max(1)),
            identity_locks: IdentityLocks::new(),
        }
    }

    /// Override the portal locators.
    pub fn with_layout(mut self, layout: PortalLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Override the bounded waits.
    pub fn with_timeouts(mut self, navigation: NavigationTimeouts, steps: StepTimeouts) -> Self {
        self.navigation = navigation;
        self.steps = steps;
        self
    }

    /// Directory artifacts are written to.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Enrollments that may start right now without waiting for a permit.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one enrollment.
    ///
    /// The browser session is closed before returning, whatever the outcome.
    /// Files written before a failure are left on disk.
    pub async fn enroll(
        &self,
        request: &EnrollmentRequest,
    ) -> Result<EnrollmentResult, EnrollError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EnrollError::Browser("enrollment pool is shut down".to_string()))?;

        tokio::fs::create_dir_all(&self.work_dir).await?;

        let session = self.sessions.open_session().await?;
        let result = self.run(session.as_ref(), request).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close browser session");
        }

        match &result {
            Ok(done) => info!(
                identity = %done.identity,
                alias = %done.alias,
                "Enrollment completed"
            ),
            Err(e) => warn!(kind = e.kind(), error = %e, "Enrollment failed"),
        }
        result
    }

    async fn run(
        &self,
        session: &dyn BrowserSession,
        request: &EnrollmentRequest,
    ) -> Result<EnrollmentResult, EnrollError> {
        let landing = session.open(&self.portal_url).await?;

        let authenticated = authenticate(
            session,
            landing,
            &request.user_id,
            request.expose_secret(),
            &self.layout,
            &self.steps,
        )
        .await?;
        let identity = authenticated.identity;

        let _identity_guard = self.identity_locks.lock(identity.sanitized_name()).await;

        let year = Local::now().year();
        let paths = ArtifactPaths::derive(&self.work_dir, &identity, year);
        info!(identity = %identity, year, "Generating key pair and CSR");

        self.toolkit
            .generate_key_pair(&paths.private_key_path)
            .await?;
        let subject = SubjectFields::for_taxpayer(&identity, &request.tax_id);
        let csr_path = self
            .toolkit
            .generate_csr(&paths.private_key_path, &subject, &paths.csr_path)
            .await?;
        self.toolkit
            .verify_csr_matches_key(&csr_path, &paths.private_key_path)
            .await?;

        let admin =
            reach_admin_surface(session, authenticated.surface, &self.layout, self.navigation)
                .await?;

        let submission = submit_csr(
            session,
            admin.surface,
            &identity,
            &csr_path,
            &self.layout,
            &self.steps,
        )
        .await?;

        let downloaded = download_certificate(
            session,
            admin.surface,
            &submission.alias,
            &self.layout,
            &self.steps,
        )
        .await?;
        let certificate = normalize_certificate(&downloaded)
            .map_err(|e| EnrollError::Download(format!("not a certificate: {}", e)))?;
        self.check_certificate_key(&certificate, &paths.private_key_path)
            .await?;
        tokio::fs::write(&paths.crt_path, &certificate).await?;
        match summarize_certificate(&certificate) {
            Ok(summary) => info!(
                path = %paths.crt_path.display(),
                subject = %summary.subject,
                issuer = %summary.issuer,
                serial = %summary.serial,
                not_after = summary.not_after,
                "Certificate written"
            ),
            Err(e) => warn!(error = %e, "Certificate written but could not be summarized"),
        }

        self.toolkit
            .bundle_pkcs12(&paths.private_key_path, &paths.crt_path, &paths.pfx_path)
            .await?;

        Ok(EnrollmentResult::success(identity, paths, submission.alias))
    }

    /// Reject a certificate that was not issued for the generated key.
    ///
    /// A rejected CSR leaves the portal showing older aliases, and the
    /// download falls back to one of those.
    async fn check_certificate_key(
        &self,
        certificate: &[u8],
        key_path: &Path,
    ) -> Result<(), EnrollError> {
        let from_certificate = certificate_public_key_der(certificate)
            .map_err(|e| EnrollError::Download(format!("not a certificate: {}", e)))?;
        let from_key = self.toolkit.public_key_der(key_path).await?;

        if from_certificate != from_key {
            return Err(EnrollError::Download(
                "downloaded certificate does not belong to the generated key".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    use arca_core::SUCCESS_MESSAGE;
    use arca_portal::testing::{AdminLinkVariant, CertificateSource, PortalScript, ScriptedFactory};

    pub(crate) fn openssl_available() -> bool {
        Command::new("openssl")
            .arg("version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Self-sign the uploaded CSR with the key next to it, as DER.
    pub(crate) fn self_signing_portal() -> CertificateSource {
        CertificateSource::FromCsr(Arc::new(|csr: &Path| {
            let file_name = csr.file_name()?.to_str()?;
            let key = csr
                .with_file_name(file_name.replace("MiPedidoCSR", "MiClavePrivada"))
                .with_extension("key");
            let output = Command::new("openssl")
                .args(["x509", "-req", "-days", "1", "-outform", "DER", "-in"])
                .arg(csr)
                .arg("-signkey")
                .arg(&key)
                .output()
                .ok()?;
            output.status.success().then_some(output.stdout)
        }))
    }

    pub(crate) fn fast_timeouts() -> (NavigationTimeouts, StepTimeouts) {
        let poll = Duration::from_millis(5);
        let wait = Duration::from_millis(50);
        (
            NavigationTimeouts {
                link_wait: wait,
                modal_wait: wait,
                popup_wait: wait,
                poll_interval: poll,
            },
            StepTimeouts {
                login_popup_wait: wait,
                field_wait: wait,
                identity_wait: wait,
                form_wait: wait,
                upload_wait: wait,
                confirmation_wait: wait,
                download_wait: wait,
                settle_fallback: Duration::from_millis(10),
                poll_interval: poll,
            },
        )
    }

    pub(crate) fn service(factory: Arc<ScriptedFactory>, work_dir: &Path) -> EnrollmentService {
        let config = Config {
            work_dir: work_dir.to_path_buf(),
            ..Config::default()
        };
        let (navigation, steps) = fast_timeouts();
        EnrollmentService::new(factory, &config).with_timeouts(navigation, steps)
    }

    fn request() -> EnrollmentRequest {
        EnrollmentRequest::new(
            Some("20111111111".to_string()),
            Some("20111111111".to_string()),
            Some("secret".to_string()),
        )
        .unwrap()
    }

    fn artifact_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file())
                    .count()
            })
            .unwrap_or(0)
    }

    fn has_certificate(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.path().extension().is_some_and(|ext| ext == "crt"))
    }

    #[tokio::test]
    async fn test_enrollment_writes_four_artifacts() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            certificate: self_signing_portal(),
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let result = service.enroll(&request()).await.unwrap();

        assert_eq!(result.message, SUCCESS_MESSAGE);
        assert_eq!(result.identity.sanitized_name(), "PEREZ_JUAN");
        for path in result.paths.all() {
            assert!(path.is_file(), "{} missing", path.display());
        }
        let crt = std::fs::read_to_string(&result.paths.crt_path).unwrap();
        assert!(crt.starts_with("-----BEGIN CERTIFICATE-----"));

        let sessions = factory.sessions();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_closed());
        assert_eq!(sessions[0].registered_aliases(), vec![result.alias.to_string()]);
    }

    #[tokio::test]
    async fn test_missing_identity_fails_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            identity: None,
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert!(matches!(err, EnrollError::Authentication(_)));
        assert_eq!(artifact_count(dir.path()), 0);
        assert!(factory.sessions()[0].is_closed());
    }

    #[tokio::test]
    async fn test_navigation_failure_closes_session() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            admin_link: AdminLinkVariant::Missing,
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert!(matches!(err, EnrollError::Navigation(_)));
        assert!(factory.sessions()[0].is_closed());
        // Key and CSR are left behind.
        assert_eq!(artifact_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_portal_open_failure_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            fail_open: true,
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert_eq!(err.kind(), "browser");
        assert!(factory.sessions()[0].is_closed());
    }

    #[tokio::test]
    async fn test_missing_download_fails() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            certificate: CertificateSource::Never,
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert!(matches!(err, EnrollError::Download(_)));
        assert!(factory.sessions()[0].is_closed());
    }

    /// A PEM certificate for a freshly generated key unrelated to any CSR.
    fn foreign_certificate(dir: &Path) -> Vec<u8> {
        let key = dir.join("foreign.key");
        let crt = dir.join("foreign.crt");
        let status = Command::new("openssl")
            .args(["req", "-x509", "-newkey", "rsa:2048", "-nodes", "-days", "1"])
            .args(["-subj", "/CN=CERTIFICADO_OLD_1", "-keyout"])
            .arg(&key)
            .arg("-out")
            .arg(&crt)
            .output()
            .unwrap()
            .status;
        assert!(status.success());
        std::fs::read(&crt).unwrap()
    }

    #[tokio::test]
    async fn test_non_certificate_download_is_a_download_error() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            certificate: CertificateSource::Bytes(b"<html>sesion expirada</html>".to_vec()),
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert_eq!(err.kind(), "download");
        assert!(!has_certificate(dir.path()));
        // Only the key and the CSR.
        assert_eq!(artifact_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_rejected_csr_does_not_keep_another_certificate() {
        if !openssl_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            accept_csr: false,
            existing_aliases: vec!["CERTIFICADO_OLD_1".to_string()],
            certificate: CertificateSource::Bytes(foreign_certificate(elsewhere.path())),
            ..PortalScript::default()
        }));
        let service = service(factory.clone(), dir.path());

        let err = service.enroll(&request()).await.unwrap_err();

        assert!(matches!(err, EnrollError::Download(_)), "{err}");
        let sessions = factory.sessions();
        assert_eq!(sessions[0].opened_row().as_deref(), Some("CERTIFICADO_OLD_1"));
        assert!(sessions[0].is_closed());
        assert!(!has_certificate(dir.path()));
        assert_eq!(artifact_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_permits_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedFactory::new(PortalScript {
            identity: None,
            ..PortalScript::default()
        }));
        let service = service(factory, dir.path());
        let before = service.available_permits();

        let _ = service.enroll(&request()).await;
        assert_eq!(service.available_permits(), before);
    }
}
