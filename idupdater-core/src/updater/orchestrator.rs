//! Update orchestrator - drives check → compare → download → verify → install
//!
//! One orchestrator exists per process. Its run context (mode flags, pinned
//! certificates, installed product cache, current state) is owned by a single
//! mutex that is never held across an await point, so transitions are
//! serialized without blocking the observer.

use super::downloader::{ProgressCallback, Transport};
use super::installer::Installer;
use super::observer::{ProgressThrottle, UpdateObserver, WindowFactory};
use super::product::{InstalledProduct, ProductRegistry};
use super::types::{status, Outcome, UpdateInfo, UpdateState};
use crate::config::{ConfigSource, RemoteConfiguration, SideMessage};
use crate::error::UpdaterError;
use crate::trust::{compute_checksum, PinnedCertificates, TrustDecision, TrustVerifier};
use crate::version;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// External collaborators the orchestrator drives
pub struct Collaborators {
    pub config: Arc<dyn ConfigSource>,
    pub products: Arc<dyn ProductRegistry>,
    pub transport: Arc<dyn Transport>,
    pub verifier: TrustVerifier,
    pub installer: Arc<dyn Installer>,
    /// Upgrade code used when the configuration carries none
    pub default_upgrade_code: String,
}

#[derive(Debug)]
struct RunContext {
    state: UpdateState,
    autoupdate: bool,
    autoclose: bool,
    pinned: PinnedCertificates,
    installed: Option<InstalledProduct>,
    last_error: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            state: UpdateState::Idle,
            autoupdate: false,
            autoclose: false,
            pinned: PinnedCertificates::default(),
            installed: None,
            last_error: None,
        }
    }
}

fn lock_context(context: &Mutex<RunContext>) -> MutexGuard<'_, RunContext> {
    context.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct UpdateOrchestrator {
    collaborators: Collaborators,
    observer: Mutex<Option<Arc<dyn UpdateObserver>>>,
    window_factory: Option<WindowFactory>,
    context: Arc<Mutex<RunContext>>,
}

impl UpdateOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            observer: Mutex::new(None),
            window_factory: None,
            context: Arc::new(Mutex::new(RunContext::default())),
        }
    }

    /// Attach an already existing observer
    pub fn with_observer(self, observer: Arc<dyn UpdateObserver>) -> Self {
        *self.observer.lock().unwrap_or_else(|p| p.into_inner()) = Some(observer);
        self
    }

    /// Create the observer window lazily when the run needs one
    pub fn with_window_factory(mut self, factory: WindowFactory) -> Self {
        self.window_factory = Some(factory);
        self
    }

    /// Current state
    pub fn state(&self) -> UpdateState {
        lock_context(&self.context).state.clone()
    }

    /// Error surfaced by the most recent run, if any
    pub fn last_error(&self) -> Option<String> {
        lock_context(&self.context).last_error.clone()
    }

    /// Certificates pinned by the last successful configuration fetch
    pub fn pinned_certificates(&self) -> PinnedCertificates {
        lock_context(&self.context).pinned.clone()
    }

    /// Whether an observer is attached
    pub fn has_observer(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Start an update check
    pub async fn check_updates(&self, autoupdate: bool, autoclose: bool) -> Outcome {
        {
            let mut ctx = lock_context(&self.context);
            if matches!(
                ctx.state,
                UpdateState::CheckingConfig
                    | UpdateState::Downloading { .. }
                    | UpdateState::Verifying(_)
                    | UpdateState::Installing(_)
            ) {
                warn!("Update check requested while {} is in progress, ignoring", ctx.state);
                return Outcome::Continue;
            }
            ctx.autoupdate = autoupdate;
            ctx.autoclose = autoclose;
            ctx.last_error = None;
        }
        info!(
            "Checking for updates (autoupdate: {}, autoclose: {})",
            autoupdate, autoclose
        );

        if !autoclose {
            self.ensure_window();
        }

        self.transition(UpdateState::CheckingConfig);
        self.notify(|o| o.on_status(status::CHECKING));

        let config = match self.collaborators.config.fetch().await {
            Ok(config) => config,
            Err(e) => {
                let e = match e {
                    e if e.is_config_error() => e,
                    other => UpdaterError::ConfigFetch(other.to_string()),
                };
                return self.fail(UpdateState::ConfigError(e.to_string()), &e.to_string(), false);
            }
        };

        self.notify(|o| o.on_status(status::CHECK_COMPLETED));
        self.surface_message(&config).await;

        let upgrade_code = config
            .upgrade_code_or(&self.collaborators.default_upgrade_code)
            .to_string();
        let installed = {
            let mut ctx = lock_context(&self.context);
            ctx.pinned = PinnedCertificates::new(config.certificates.iter().cloned());
            debug!("Pinned {} publisher certificates", ctx.pinned.len());
            let product = InstalledProduct::refresh(
                ctx.installed.take(),
                self.collaborators.products.as_ref(),
                &upgrade_code,
            );
            ctx.installed = Some(product.clone());
            product
        };

        let installed_version = match installed.version {
            Some(v) if version::less_than(&v, &config.latest_version) => v,
            Some(v) => {
                info!("Installed version {} is current (latest {})", v, config.latest_version);
                return self.no_update(autoclose);
            }
            None => {
                info!("Product {} is not installed, nothing to update", upgrade_code);
                return self.no_update(autoclose);
            }
        };

        let info = UpdateInfo {
            installed: installed_version,
            available: config.latest_version.clone(),
            download_url: config.download_url.clone(),
        };
        info!("Update available: {} -> {}", info.installed, info.available);
        self.transition(UpdateState::UpdateAvailable(info.clone()));
        self.notify(|o| o.on_status(status::UPDATE_AVAILABLE));

        if autoupdate {
            self.install_update(info).await
        } else {
            self.ensure_window();
            Outcome::Continue
        }
    }

    /// User accepted the offered update
    pub async fn accept(&self) -> Outcome {
        let info = match &lock_context(&self.context).state {
            UpdateState::UpdateAvailable(info) => info.clone(),
            other => {
                warn!("Accept ignored in state {}", other);
                return Outcome::Continue;
            }
        };
        info!("User accepted update to {}", info.available);
        self.install_update(info).await
    }

    /// User rejected the offered update or closed the window
    ///
    /// Only honored while waiting for acceptance; work already in flight runs
    /// to completion.
    pub fn reject(&self) -> Outcome {
        let mut ctx = lock_context(&self.context);
        if let UpdateState::UpdateAvailable(info) = &ctx.state {
            info!("User rejected update to {}", info.available);
            ctx.state = UpdateState::Idle;
            Outcome::Exit(0)
        } else {
            info!("Reject ignored in state {}", ctx.state);
            Outcome::Continue
        }
    }

    async fn install_update(&self, info: UpdateInfo) -> Outcome {
        let (autoupdate, pinned) = {
            let ctx = lock_context(&self.context);
            (ctx.autoupdate, ctx.pinned.clone())
        };

        self.transition(UpdateState::Downloading {
            info: info.clone(),
            received: 0,
            total: 0,
        });
        self.notify(|o| o.on_status(status::DOWNLOADING));

        let package = match self
            .collaborators
            .transport
            .download(&info.download_url, self.progress_callback(info.clone()))
            .await
        {
            Ok(path) => path,
            Err(e) => {
                // Transport errors return the run to idle
                return self.fail(UpdateState::Idle, &e.to_string(), false);
            }
        };

        self.notify(|o| o.on_status(status::DOWNLOAD_FINISHED));
        self.transition(UpdateState::Verifying(info.clone()));

        let decision = self.verify(package.clone(), pinned, !autoupdate).await;
        let signer = match decision.into_result() {
            Ok(signer) => signer,
            Err(e) => {
                remove_package(&package);
                return self.fail(UpdateState::VerifyFailed(e.to_string()), &e.to_string(), true);
            }
        };
        info!("Package {} verified, signed by '{}'", package.display(), signer);

        self.transition(UpdateState::Installing(info));
        if let Err(e) = self.collaborators.installer.install(&package, autoupdate) {
            remove_package(&package);
            return self.fail(UpdateState::InstallFailed(e.to_string()), &e.to_string(), false);
        }

        self.transition(UpdateState::Done);
        self.notify(|o| o.on_status(status::INSTALLED));
        Outcome::Exit(0)
    }

    async fn verify(&self, package: PathBuf, pinned: PinnedCertificates, interactive: bool) -> TrustDecision {
        let verifier = self.collaborators.verifier.clone();
        let task = tokio::task::spawn_blocking(move || {
            match compute_checksum(&package) {
                Ok(sum) => info!("Downloaded package SHA256: {}", sum),
                Err(e) => warn!("Could not compute package checksum: {}", e),
            }
            verifier.evaluate(&package, &pinned, interactive)
        });

        match task.await {
            Ok(decision) => decision,
            Err(e) => {
                error!("Verification task failed: {}", e);
                TrustDecision {
                    trusted: false,
                    signer: None,
                    reason: Some(format!("verification did not complete: {}", e)),
                }
            }
        }
    }

    fn progress_callback(&self, info: UpdateInfo) -> ProgressCallback {
        let observer = self.current_observer();
        let context = Arc::clone(&self.context);
        let throttle = Mutex::new(ProgressThrottle::default());

        Box::new(move |received, total| {
            {
                let mut ctx = lock_context(&context);
                ctx.state = UpdateState::Downloading {
                    info: info.clone(),
                    received,
                    total,
                };
            }
            let emit = throttle
                .lock()
                .map(|mut t| t.should_emit(received, total, Instant::now()))
                .unwrap_or(true);
            if emit {
                if let Some(observer) = &observer {
                    observer.on_download_progress(received, total);
                }
            }
        })
    }

    async fn surface_message(&self, config: &RemoteConfiguration) {
        let text = match &config.message {
            None => return,
            Some(SideMessage::Inline(text)) => text.clone(),
            Some(SideMessage::Remote(url)) => match self.collaborators.config.fetch_message(url).await {
                Ok(text) if !text.is_empty() => text,
                Ok(_) => return,
                Err(e) => {
                    warn!("Failed to fetch message from {}: {}", url, e);
                    return;
                }
            },
        };
        info!("Configuration message: {}", text);
        self.notify(|o| o.on_message(&text));
    }

    fn no_update(&self, autoclose: bool) -> Outcome {
        self.transition(UpdateState::NoUpdateAvailable);
        self.notify(|o| o.on_status(status::NO_UPDATES));
        if autoclose {
            Outcome::Exit(0)
        } else {
            Outcome::Continue
        }
    }

    /// Enter a failure state, surface `message`, and decide whether to exit
    fn fail(&self, state: UpdateState, message: &str, always_surface: bool) -> Outcome {
        error!("{}", message);
        let autoclose = {
            let mut ctx = lock_context(&self.context);
            ctx.last_error = Some(message.to_string());
            ctx.autoclose
        };
        self.transition(state);

        if always_surface {
            self.ensure_window();
        }
        self.notify(|o| o.on_error(message));

        if autoclose {
            Outcome::Exit(1)
        } else {
            Outcome::Continue
        }
    }

    fn transition(&self, next: UpdateState) {
        let mut ctx = lock_context(&self.context);
        info!("Update state: {} -> {}", ctx.state, next);
        ctx.state = next;
    }

    fn current_observer(&self) -> Option<Arc<dyn UpdateObserver>> {
        self.observer.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn ensure_window(&self) {
        let mut observer = self.observer.lock().unwrap_or_else(|p| p.into_inner());
        if observer.is_none() {
            if let Some(factory) = &self.window_factory {
                debug!("Creating observer window");
                *observer = Some(factory());
            }
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn UpdateObserver)) {
        if let Some(observer) = self.current_observer() {
            f(observer.as_ref());
        }
    }
}

fn remove_package(package: &Path) {
    if let Err(e) = std::fs::remove_file(package) {
        debug!("Could not remove {}: {}", package.display(), e);
    }
}
