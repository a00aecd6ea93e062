//! Error kinds shared by the updater core

/// Errors surfaced by the updater core
///
/// Every variant is recovered at the orchestrator boundary into a single
/// observer-visible message; none of them abort the process.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error("Failed to fetch update configuration: {0}")]
    ConfigFetch(String),

    #[error("Invalid update configuration: {0}")]
    InvalidConfig(String),

    #[error("No active desktop session")]
    NoActiveSession,

    #[error("Failed to acquire session user token: {0}")]
    TokenAcquisition(String),

    #[error("Failed to create process in user session: {0}")]
    ProcessCreation(String),

    #[error("Scheduled task error: {0}")]
    Scheduling(String),

    #[error("Scheduled task '{0}' does not exist")]
    TaskNotFound(String),

    #[error("Download failed: {0}")]
    Transport(String),

    #[error("Downloaded package integrity check failed: {0}")]
    TrustVerification(String),

    #[error("Package installation failed: {0}")]
    InstallLaunch(String),
}

impl UpdaterError {
    /// Returns true for failures reaching or parsing the remote configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            UpdaterError::ConfigFetch(_) | UpdaterError::InvalidConfig(_)
        )
    }
}

/// Result type for updater operations
pub type Result<T> = std::result::Result<T, UpdaterError>;
