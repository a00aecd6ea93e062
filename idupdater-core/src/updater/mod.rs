//! Update orchestration
//!
//! The orchestrator drives the remote configuration, the installed product
//! lookup, the package transport, trust verification and the installer.
//! Platform pieces sit behind the traits re-exported here.

pub mod downloader;
pub mod installer;
pub mod observer;
pub mod orchestrator;
pub mod product;
pub mod types;

pub use downloader::{HttpTransport, ProgressCallback, Transport};
pub use installer::{Installer, MsiInstaller};
pub use observer::{ProgressThrottle, UpdateObserver, WindowFactory};
pub use orchestrator::{Collaborators, UpdateOrchestrator};
pub use product::{InstalledProduct, ProductRegistry};
pub use types::{status, Outcome, UpdateInfo, UpdateState};
