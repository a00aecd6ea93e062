//! Orchestrator end-to-end tests
//!
//! Drives a full update run against a local HTTP server serving the
//! configuration document and the installer package.
//! Run with: cargo test --test orchestrator_flow

use base64::{engine::general_purpose::STANDARD, Engine};
use idupdater_core::config::{user_agent, HttpConfigSource};
use idupdater_core::error::{Result, UpdaterError};
use idupdater_core::trust::{SignatureInspector, SignerCertificate, TrustVerifier};
use idupdater_core::updater::{
    status, Collaborators, HttpTransport, Installer, Outcome, ProductRegistry, UpdateObserver,
    UpdateOrchestrator, UpdateState,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPGRADE_CODE: &str = "{58A1DBA8-81A2-4D58-980B-4A6174D5B66B}";
const PUBLISHER: &str = "RIIGI INFOSUSTEEMI AMET";

/// Packages are `<signer>\n<payload>`; a signature is valid when the
/// payload is exactly `SIGNED_PAYLOAD`.
const SIGNED_PAYLOAD: &[u8] = b"msi-payload";

struct LineInspector {
    interactive: Mutex<Vec<bool>>,
}

impl LineInspector {
    fn new() -> Self {
        Self {
            interactive: Mutex::new(Vec::new()),
        }
    }

    fn split(package: &Path) -> Option<(String, Vec<u8>)> {
        let bytes = std::fs::read(package).ok()?;
        let pos = bytes.iter().position(|b| *b == b'\n')?;
        Some((
            String::from_utf8(bytes[..pos].to_vec()).ok()?,
            bytes[pos + 1..].to_vec(),
        ))
    }
}

fn der(subject: &str) -> Vec<u8> {
    format!("CERT/{}", subject).into_bytes()
}

fn package(signer: &str, payload: &[u8]) -> Vec<u8> {
    let mut bytes = format!("{}\n", signer).into_bytes();
    bytes.extend_from_slice(payload);
    bytes
}

impl SignatureInspector for LineInspector {
    fn signer_certificate(&self, package: &Path) -> Result<SignerCertificate> {
        let (subject, _) = Self::split(package)
            .ok_or_else(|| UpdaterError::TrustVerification("not signed".into()))?;
        Ok(SignerCertificate {
            der: der(&subject),
            subject,
        })
    }

    fn verify_signature(&self, package: &Path, interactive: bool) -> Result<()> {
        self.interactive.lock().unwrap().push(interactive);
        match Self::split(package) {
            Some((_, payload)) if payload == SIGNED_PAYLOAD => Ok(()),
            _ => Err(UpdaterError::TrustVerification("hash mismatch".into())),
        }
    }
}

struct Registry(&'static str);

impl ProductRegistry for Registry {
    fn installed_version(&self, upgrade_code: &str) -> Option<String> {
        (upgrade_code == UPGRADE_CODE).then(|| self.0.to_string())
    }
}

#[derive(Default)]
struct InstallLog {
    installs: Mutex<Vec<(PathBuf, bool)>>,
}

impl Installer for InstallLog {
    fn install(&self, package: &Path, silent: bool) -> Result<()> {
        self.installs
            .lock()
            .unwrap()
            .push((package.to_path_buf(), silent));
        Ok(())
    }
}

#[derive(Default)]
struct Events {
    log: Mutex<Vec<String>>,
}

impl UpdateObserver for Events {
    fn on_status(&self, text: &str) {
        self.log.lock().unwrap().push(format!("status:{}", text));
    }
    fn on_error(&self, text: &str) {
        self.log.lock().unwrap().push(format!("error:{}", text));
    }
    fn on_message(&self, text: &str) {
        self.log.lock().unwrap().push(format!("message:{}", text));
    }
    fn on_download_progress(&self, received: u64, total: u64) {
        self.log
            .lock()
            .unwrap()
            .push(format!("progress:{}/{}", received, total));
    }
}

impl Events {
    fn contains(&self, entry: &str) -> bool {
        self.log.lock().unwrap().iter().any(|e| e == entry)
    }

    fn errors(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("error:"))
            .cloned()
            .collect()
    }
}

struct Flow {
    _server: MockServer,
    download_dir: tempfile::TempDir,
    orchestrator: UpdateOrchestrator,
    inspector: Arc<LineInspector>,
    installer: Arc<InstallLog>,
    events: Arc<Events>,
}

async fn flow(installed: &'static str, latest: &str, package_body: Vec<u8>) -> Flow {
    let server = MockServer::start().await;
    let config = serde_json::json!({
        "schema_version": 1,
        "latest_version": latest,
        "download_url": format!("{}/media/Open-EID-{}.msi", server.uri(), latest),
        "certificates": [STANDARD.encode(der(PUBLISHER))],
        "message": "Please keep your ID-card software up to date",
    });
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/media/Open-EID-{}.msi", latest)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(package_body))
        .mount(&server)
        .await;

    let agent = user_agent(installed, false);
    let download_dir = tempfile::tempdir().unwrap();
    let inspector = Arc::new(LineInspector::new());
    let installer = Arc::new(InstallLog::default());
    let events = Arc::new(Events::default());

    let orchestrator = UpdateOrchestrator::new(Collaborators {
        config: Arc::new(
            HttpConfigSource::new(&format!("{}/config.json", server.uri()), &agent).unwrap(),
        ),
        products: Arc::new(Registry(installed)),
        transport: Arc::new(HttpTransport::new(&agent, download_dir.path().to_path_buf()).unwrap()),
        verifier: TrustVerifier::new(inspector.clone()),
        installer: installer.clone(),
        default_upgrade_code: UPGRADE_CODE.to_string(),
    })
    .with_observer(events.clone());

    Flow {
        _server: server,
        download_dir,
        orchestrator,
        inspector,
        installer,
        events,
    }
}

mod decision_tests {
    use super::*;

    #[tokio::test]
    async fn test_newer_version_waits_for_acceptance() {
        let f = flow("2.3.0", "2.3.1", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        let outcome = f.orchestrator.check_updates(false, false).await;

        assert_eq!(outcome, Outcome::Continue);
        match f.orchestrator.state() {
            UpdateState::UpdateAvailable(info) => {
                assert_eq!(info.installed, "2.3.0");
                assert_eq!(info.available, "2.3.1");
            }
            other => panic!("expected UpdateAvailable, got {:?}", other),
        }
        assert!(f.events.contains(&format!("status:{}", status::UPDATE_AVAILABLE)));
        assert!(f.events.contains("message:Please keep your ID-card software up to date"));
        assert!(f.installer.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equal_version_has_no_update() {
        let f = flow("2.3.1", "2.3.1", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        assert_eq!(f.orchestrator.check_updates(false, false).await, Outcome::Continue);
        assert_eq!(f.orchestrator.state(), UpdateState::NoUpdateAvailable);
        assert!(f.events.contains(&format!("status:{}", status::NO_UPDATES)));
    }

    #[tokio::test]
    async fn test_equal_version_with_autoclose_exits_zero() {
        let f = flow("2.3.1", "2.3.1", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        assert_eq!(f.orchestrator.check_updates(false, true).await, Outcome::Exit(0));
        assert_eq!(f.orchestrator.state(), UpdateState::NoUpdateAvailable);
    }

    #[tokio::test]
    async fn test_newer_installed_than_advertised() {
        let f = flow("2.4.0", "2.3.10", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        assert_eq!(f.orchestrator.check_updates(true, true).await, Outcome::Exit(0));
        assert_eq!(f.orchestrator.state(), UpdateState::NoUpdateAvailable);
    }
}

mod install_tests {
    use super::*;

    #[tokio::test]
    async fn test_autoupdate_runs_through_to_install() {
        let f = flow("2.3.0", "2.3.1", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        let outcome = f.orchestrator.check_updates(true, true).await;

        assert_eq!(outcome, Outcome::Exit(0));
        assert_eq!(f.orchestrator.state(), UpdateState::Done);

        // Unattended: no verification UI, silent installer
        assert_eq!(*f.inspector.interactive.lock().unwrap(), vec![false]);
        let installs = f.installer.installs.lock().unwrap();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].0, f.download_dir.path().join("Open-EID-2.3.1.msi"));
        assert!(installs[0].1);

        assert!(f.events.contains(&format!("status:{}", status::DOWNLOADING)));
        assert!(f.events.contains(&format!("status:{}", status::INSTALLED)));
        let total = package(PUBLISHER, SIGNED_PAYLOAD).len();
        assert!(f.events.contains(&format!("progress:{}/{}", total, total)));
    }

    #[tokio::test]
    async fn test_accepted_update_installs_interactively() {
        let f = flow("2.3.0", "2.3.1", package(PUBLISHER, SIGNED_PAYLOAD)).await;

        assert_eq!(f.orchestrator.check_updates(false, false).await, Outcome::Continue);
        assert_eq!(f.orchestrator.accept().await, Outcome::Exit(0));

        assert_eq!(*f.inspector.interactive.lock().unwrap(), vec![true]);
        assert!(!f.installer.installs.lock().unwrap()[0].1);
    }

    #[tokio::test]
    async fn test_tampered_package_is_reported_in_silent_mode() {
        let f = flow("2.3.0", "2.3.1", package(PUBLISHER, b"msi-payload-modified")).await;

        let outcome = f.orchestrator.check_updates(true, true).await;

        assert_eq!(outcome, Outcome::Exit(1));
        assert!(matches!(f.orchestrator.state(), UpdateState::VerifyFailed(_)));
        let errors = f.events.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with(&format!("error:{}", status::INTEGRITY_FAILED)));
        assert!(f.installer.installs.lock().unwrap().is_empty());
        assert!(!f.download_dir.path().join("Open-EID-2.3.1.msi").exists());
    }

    #[tokio::test]
    async fn test_unpinned_publisher_is_rejected() {
        let f = flow("2.3.0", "2.3.1", package("Other Publisher", SIGNED_PAYLOAD)).await;

        assert_eq!(f.orchestrator.check_updates(true, false).await, Outcome::Continue);
        assert!(matches!(f.orchestrator.state(), UpdateState::VerifyFailed(_)));
        // Pinning failed first, the platform check never ran
        assert!(f.inspector.interactive.lock().unwrap().is_empty());
        assert!(f.orchestrator.last_error().is_some());
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_configuration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let events = Arc::new(Events::default());
        let orchestrator = UpdateOrchestrator::new(Collaborators {
            config: Arc::new(
                HttpConfigSource::new(&format!("{}/config.json", server.uri()), "id-updater/test").unwrap(),
            ),
            products: Arc::new(Registry("2.3.0")),
            transport: Arc::new(HttpTransport::in_temp_dir("id-updater/test").unwrap()),
            verifier: TrustVerifier::new(Arc::new(LineInspector::new())),
            installer: Arc::new(InstallLog::default()),
            default_upgrade_code: UPGRADE_CODE.to_string(),
        })
        .with_observer(events.clone());

        assert_eq!(orchestrator.check_updates(true, true).await, Outcome::Exit(1));
        assert!(matches!(orchestrator.state(), UpdateState::ConfigError(_)));
        assert_eq!(events.errors().len(), 1);
    }
}
