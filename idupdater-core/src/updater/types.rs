//! Types for the update orchestrator

use std::fmt;

/// Current state of the update process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    /// No update activity
    Idle,
    /// Fetching the remote configuration
    CheckingConfig,
    /// Configuration could not be fetched or parsed
    ConfigError(String),
    /// Installed version is current (or the product is not installed)
    NoUpdateAvailable,
    /// Newer version advertised, waiting for acceptance unless autoupdating
    UpdateAvailable(UpdateInfo),
    /// Downloading the installer package
    Downloading {
        info: UpdateInfo,
        received: u64,
        total: u64,
    },
    /// Checking the downloaded package's signature
    Verifying(UpdateInfo),
    /// Package failed pinning or signature verification
    VerifyFailed(String),
    /// Installer has been handed the package
    Installing(UpdateInfo),
    /// Installer could not be started
    InstallFailed(String),
    /// Installation started successfully
    Done,
}

impl UpdateState {
    /// Returns true while waiting for the user to accept or reject
    pub fn is_awaiting_acceptance(&self) -> bool {
        matches!(self, UpdateState::UpdateAvailable(_))
    }

    /// Returns the update info if available
    pub fn get_info(&self) -> Option<&UpdateInfo> {
        match self {
            UpdateState::UpdateAvailable(info)
            | UpdateState::Downloading { info, .. }
            | UpdateState::Verifying(info)
            | UpdateState::Installing(info) => Some(info),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::Idle => write!(f, "Idle"),
            UpdateState::CheckingConfig => write!(f, "CheckingConfig"),
            UpdateState::ConfigError(_) => write!(f, "ConfigError"),
            UpdateState::NoUpdateAvailable => write!(f, "NoUpdateAvailable"),
            UpdateState::UpdateAvailable(info) => write!(f, "UpdateAvailable({})", info.available),
            UpdateState::Downloading { received, total, .. } => {
                write!(f, "Downloading({}/{})", received, total)
            }
            UpdateState::Verifying(_) => write!(f, "Verifying"),
            UpdateState::VerifyFailed(_) => write!(f, "VerifyFailed"),
            UpdateState::Installing(_) => write!(f, "Installing"),
            UpdateState::InstallFailed(_) => write!(f, "InstallFailed"),
            UpdateState::Done => write!(f, "Done"),
        }
    }
}

/// Information about an available update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Version currently installed
    pub installed: String,
    /// Version advertised by the configuration
    pub available: String,
    /// Where the package is downloaded from
    pub download_url: String,
}

/// What the caller should do after an orchestrator step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Terminate the process with this exit code
    Exit(i32),
    /// Keep running; the observer shows the current state
    Continue,
}

/// Human-readable status lines shown to the observer
pub mod status {
    pub const CHECKING: &str = "Checking for update..";
    pub const CHECK_COMPLETED: &str = "Check completed";
    pub const NO_UPDATES: &str = "No updates are available";
    pub const UPDATE_AVAILABLE: &str = "Update is available";
    pub const DOWNLOADING: &str = "Downloading...";
    pub const DOWNLOAD_FINISHED: &str = "Download finished, starting installation...";
    pub const INTEGRITY_FAILED: &str = "Downloaded package integrity check failed";
    pub const INSTALL_FAILED: &str = "Package installation failed";
    pub const INSTALLED: &str = "Package installed";
}
