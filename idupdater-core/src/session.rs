//! Launching the updater in the interactive user's desktop session
//!
//! A scheduler-initiated run executes under the system account without a
//! desktop. It hands the actual update check over to a new process created
//! with the token of the user owning the active session.

use crate::error::{Result, UpdaterError};
use log::{error, info};
use std::path::Path;

/// Connection state of a terminal session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Connected,
    Disconnected,
    Other,
}

/// A session on the local host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u32,
    pub state: SessionState,
}

/// First session in the active state
pub fn select_active_session(sessions: &[SessionInfo]) -> Result<u32> {
    sessions
        .iter()
        .find(|s| s.state == SessionState::Active)
        .map(|s| s.id)
        .ok_or(UpdaterError::NoActiveSession)
}

/// Creates processes inside another session
pub trait SessionLauncher {
    /// Create `command_line` in the active interactive session
    fn launch(&self, command_line: &str) -> Result<()>;
}

/// Run `command_line` in the active session, reporting success
pub fn run_in_session<L: SessionLauncher + ?Sized>(launcher: &L, command_line: &str) -> bool {
    info!("Starting in user session: {}", command_line);
    match launcher.launch(command_line) {
        Ok(()) => {
            info!("Process started in user session");
            true
        }
        Err(e) => {
            error!("Failed to start process in user session: {}", e);
            false
        }
    }
}

/// Quote one argument the way the Windows command-line parser expects
pub fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // Backslashes before the closing quote must be doubled
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// Join arguments into a single command-line string
pub fn join_arguments(args: &[String]) -> String {
    args.iter()
        .map(|a| quote_argument(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full command line for `program` with `args`
pub fn command_line(program: &Path, args: &[String]) -> String {
    let program = quote_argument(&program.to_string_lossy());
    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, join_arguments(args))
    }
}
