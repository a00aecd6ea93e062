//! Core of the ID software updater
//!
//! Portable logic shared by the platform front ends: version comparison,
//! the remote configuration, pinned-certificate trust verification,
//! scheduled task management, cross-session launch helpers and the update
//! orchestrator.

pub mod config;
pub mod error;
pub mod schedule;
pub mod session;
pub mod settings;
pub mod trust;
pub mod updater;
pub mod utils;
pub mod version;

pub use config::{ConfigSource, HttpConfigSource, RemoteConfiguration, SideMessage};
pub use error::{Result, UpdaterError};
pub use schedule::{Interval, ScheduleManager, SchedulerBackend};
pub use session::{run_in_session, SessionLauncher};
pub use settings::UpdaterSettings;
pub use trust::{PinnedCertificates, SignatureInspector, SignerCertificate, TrustDecision, TrustVerifier};
pub use updater::{Outcome, UpdateObserver, UpdateOrchestrator, UpdateState};
