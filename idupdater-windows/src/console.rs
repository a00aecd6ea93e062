//! Console observer and the choice between console and dialog output

use idupdater_core::updater::UpdateObserver;
use log::info;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Where notifications and the install offer are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Lines on stdout, answers read from stdin
    Console,
    /// Message boxes on the interactive desktop
    Dialog,
}

impl Presentation {
    /// A process started without a console (the scheduled task relaunch)
    /// has nobody reading stdout or typing on stdin.
    pub fn detect(stdin_is_terminal: bool, has_console_window: bool) -> Self {
        if stdin_is_terminal && has_console_window {
            Presentation::Console
        } else {
            Presentation::Dialog
        }
    }
}

/// Prints orchestrator notifications as lines of text
pub struct ConsoleObserver<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn line(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", text);
            let _ = out.flush();
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

impl<W: Write + Send> UpdateObserver for ConsoleObserver<W> {
    fn on_status(&self, text: &str) {
        self.line(text);
    }

    fn on_error(&self, text: &str) {
        self.line(&format!("Error: {}", text));
    }

    fn on_message(&self, text: &str) {
        self.line(&format!("Message: {}", text));
    }

    fn on_download_progress(&self, received: u64, total: u64) {
        if total > 0 {
            self.line(&format!(
                "Downloaded {} of {} KB ({}%)",
                received / 1024,
                total / 1024,
                received * 100 / total
            ));
        } else {
            self.line(&format!("Downloaded {} KB", received / 1024));
        }
    }
}

/// Ask whether to install; only an explicit yes accepts
pub fn prompt_accept<R: BufRead, W: Write>(mut input: R, mut out: W, version: &str) -> bool {
    let _ = write!(out, "Install version {}? [y/N] ", version);
    let _ = out.flush();

    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    let accepted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
    info!("User answered '{}' to update prompt", answer.trim());
    accepted
}
