//! ID Updater for Windows
//!
//! Platform implementations of the updater core's seams plus the pieces of
//! the command-line front end that are shared with tests.

pub mod cli;
pub mod console;

#[cfg(windows)]
pub mod dialog;
#[cfg(windows)]
pub mod handles;
#[cfg(windows)]
pub mod msi;
#[cfg(windows)]
pub mod session_launcher;
#[cfg(windows)]
pub mod task_scheduler;
#[cfg(windows)]
pub mod wintrust;

#[cfg(windows)]
pub use dialog::DialogObserver;
#[cfg(windows)]
pub use msi::MsiProductRegistry;
#[cfg(windows)]
pub use session_launcher::WtsSessionLauncher;
#[cfg(windows)]
pub use task_scheduler::ComTaskScheduler;
#[cfg(windows)]
pub use wintrust::WinTrustInspector;
