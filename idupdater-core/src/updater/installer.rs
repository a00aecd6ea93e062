//! Package installer - hands a verified package to msiexec

use crate::error::{Result, UpdaterError};
use crate::utils::hidden_command;
use log::{error, info};
use std::path::{Path, PathBuf};

/// Starts the platform installer on a verified package
pub trait Installer: Send + Sync {
    /// Launch the installer; returns once the installer process has started
    fn install(&self, package: &Path, silent: bool) -> Result<()>;
}

/// msiexec-based installer
#[derive(Debug, Clone)]
pub struct MsiInstaller {
    program: String,
    log_path: PathBuf,
}

impl MsiInstaller {
    /// Installer writing its verbose log to `<temp>/<log_name>`
    pub fn new(log_name: &str) -> Self {
        Self {
            program: "msiexec.exe".to_string(),
            log_path: std::env::temp_dir().join(log_name),
        }
    }

    /// Use a different installer executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to msiexec
    pub fn arguments(&self, package: &Path, silent: bool) -> Vec<String> {
        let mut args = vec![
            "REINSTALLMODE=vdmus".to_string(),
            "ALLUSERS=1".to_string(),
            "/I".to_string(),
            package.to_string_lossy().into_owned(),
            "/l*".to_string(),
            self.log_path.to_string_lossy().into_owned(),
        ];
        if silent {
            args.push("/qn+".to_string());
        }
        args
    }
}

impl Installer for MsiInstaller {
    fn install(&self, package: &Path, silent: bool) -> Result<()> {
        if !package.exists() {
            return Err(UpdaterError::InstallLaunch(format!(
                "package not found: {}",
                package.display()
            )));
        }

        let args = self.arguments(package, silent);
        info!("Launching installer: {} {}", self.program, args.join(" "));

        match hidden_command(&self.program).args(&args).spawn() {
            Ok(child) => {
                info!("Installer started (pid {})", child.id());
                Ok(())
            }
            Err(e) => {
                error!("Failed to launch installer: {}", e);
                Err(UpdaterError::InstallLaunch(format!(
                    "Failed to launch {}: {}",
                    self.program, e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_arguments() {
        let installer = MsiInstaller::new("esteid_inst.log");
        let package = Path::new("Open-EID.msi");
        let args = installer.arguments(package, false);

        assert_eq!(&args[..4], ["REINSTALLMODE=vdmus", "ALLUSERS=1", "/I", "Open-EID.msi"]);
        assert_eq!(args[4], "/l*");
        assert!(args[5].ends_with("esteid_inst.log"));
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn test_silent_arguments() {
        let installer = MsiInstaller::new("esteid_inst.log");
        let args = installer.arguments(Path::new("Open-EID.msi"), true);
        assert_eq!(args.last().map(String::as_str), Some("/qn+"));
    }

    #[test]
    fn test_install_missing_file() {
        let result = MsiInstaller::new("esteid_inst.log").install(Path::new("nonexistent.msi"), true);
        assert!(matches!(result, Err(UpdaterError::InstallLaunch(_))));
    }

    #[test]
    fn test_install_unknown_program() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Open-EID.msi");
        std::fs::write(&package, b"msi").unwrap();

        let installer = MsiInstaller::new("esteid_inst.log").with_program("id-updater-no-such-installer");
        let result = installer.install(&package, true);
        assert!(matches!(result, Err(UpdaterError::InstallLaunch(_))));
    }
}
