//! Utility functions for the updater

use std::path::Path;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Windows CREATE_NO_WINDOW flag to prevent console windows from appearing
#[cfg(windows)]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that won't show a console window on Windows
pub fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    cmd
}

/// Maximum log file size before rotation (1MB)
const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Rotate log file if it exceeds the maximum size
///
/// Renames the current log to .old (deleting previous .old) if it's too large.
/// Returns Ok(true) if rotation occurred, Ok(false) if not needed.
pub fn rotate_log_if_needed(log_path: &Path) -> std::io::Result<bool> {
    if !log_path.exists() {
        return Ok(false);
    }

    let metadata = std::fs::metadata(log_path)?;
    if metadata.len() <= MAX_LOG_SIZE {
        return Ok(false);
    }

    let old_path = log_path.with_extension("log.old");
    if old_path.exists() {
        let _ = std::fs::remove_file(&old_path);
    }

    std::fs::rename(log_path, &old_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_command() {
        let cmd = hidden_command("msiexec.exe");
        assert!(format!("{:?}", cmd).contains("msiexec.exe"));
    }

    #[test]
    fn test_rotate_small_log_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("id-updater.log");
        std::fs::write(&log, b"short").unwrap();
        assert!(!rotate_log_if_needed(&log).unwrap());
        assert!(log.exists());
    }

    #[test]
    fn test_rotate_large_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("id-updater.log");
        std::fs::write(&log, vec![b'x'; (MAX_LOG_SIZE + 1) as usize]).unwrap();
        std::fs::write(dir.path().join("id-updater.log.old"), b"previous").unwrap();

        assert!(rotate_log_if_needed(&log).unwrap());
        assert!(!log.exists());
        let old = std::fs::read(dir.path().join("id-updater.log.old")).unwrap();
        assert_eq!(old.len() as u64, MAX_LOG_SIZE + 1);
    }

    #[test]
    fn test_rotate_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!rotate_log_if_needed(&dir.path().join("absent.log")).unwrap());
    }
}
