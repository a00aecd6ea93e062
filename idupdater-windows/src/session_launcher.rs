//! Process creation in the active terminal session

use crate::handles::{wide, OwnedHandle};
use idupdater_core::error::{Result, UpdaterError};
use idupdater_core::session::{select_active_session, SessionInfo, SessionLauncher, SessionState};
use log::{debug, info};
use std::ffi::c_void;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityImpersonation, TokenPrimary, TOKEN_ALL_ACCESS, TOKEN_ASSIGN_PRIMARY,
};
use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
use windows::Win32::System::RemoteDesktop::{
    WTSActive, WTSConnected, WTSDisconnected, WTSEnumerateSessionsW, WTSFreeMemory,
    WTSQueryUserToken, WTS_CURRENT_SERVER_HANDLE, WTS_SESSION_INFOW,
};
use windows::Win32::System::Threading::{
    CreateProcessAsUserW, CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT, PROCESS_INFORMATION,
    STARTUPINFOW,
};

struct WtsMemory(*mut WTS_SESSION_INFOW);

impl Drop for WtsMemory {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { WTSFreeMemory(self.0 as *mut c_void) };
        }
    }
}

struct EnvironmentBlock(*mut c_void);

impl Drop for EnvironmentBlock {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                let _ = DestroyEnvironmentBlock(self.0);
            }
        }
    }
}

/// Sessions on the local host
pub fn enumerate_sessions() -> Result<Vec<SessionInfo>> {
    let mut info: *mut WTS_SESSION_INFOW = std::ptr::null_mut();
    let mut count = 0u32;
    unsafe { WTSEnumerateSessionsW(WTS_CURRENT_SERVER_HANDLE, 0, 1, &mut info, &mut count) }
        .map_err(|e| UpdaterError::TokenAcquisition(format!("WTSEnumerateSessionsW: {}", e)))?;
    let info = WtsMemory(info);

    let sessions = if info.0.is_null() {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(info.0, count as usize) }
    };

    Ok(sessions
        .iter()
        .map(|s| SessionInfo {
            id: s.SessionId,
            state: match s.State {
                WTSActive => SessionState::Active,
                WTSConnected => SessionState::Connected,
                WTSDisconnected => SessionState::Disconnected,
                _ => SessionState::Other,
            },
        })
        .collect())
}

/// Launches processes as the user of the active session
#[derive(Debug, Default, Clone, Copy)]
pub struct WtsSessionLauncher;

impl WtsSessionLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl SessionLauncher for WtsSessionLauncher {
    fn launch(&self, command_line: &str) -> Result<()> {
        let session_id = select_active_session(&enumerate_sessions()?)?;
        info!("Active session ID {}", session_id);

        let mut user_token = HANDLE::default();
        unsafe { WTSQueryUserToken(session_id, &mut user_token) }
            .map_err(|e| UpdaterError::TokenAcquisition(format!("WTSQueryUserToken: {}", e)))?;
        let user_token = OwnedHandle(user_token);

        let mut primary = HANDLE::default();
        unsafe {
            DuplicateTokenEx(
                user_token.get(),
                TOKEN_ASSIGN_PRIMARY | TOKEN_ALL_ACCESS,
                None,
                SecurityImpersonation,
                TokenPrimary,
                &mut primary,
            )
        }
        .map_err(|e| UpdaterError::TokenAcquisition(format!("DuplicateTokenEx: {}", e)))?;
        let primary = OwnedHandle(primary);
        debug!("Primary token acquired");

        let mut environment: *mut c_void = std::ptr::null_mut();
        unsafe { CreateEnvironmentBlock(&mut environment, primary.get(), true) }
            .map_err(|e| UpdaterError::ProcessCreation(format!("CreateEnvironmentBlock: {}", e)))?;
        let environment = EnvironmentBlock(environment);

        let mut command = wide(command_line);
        let startup = STARTUPINFOW {
            cb: std::mem::size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };
        let mut process = PROCESS_INFORMATION::default();

        unsafe {
            CreateProcessAsUserW(
                primary.get(),
                PCWSTR::null(),
                PWSTR(command.as_mut_ptr()),
                None,
                None,
                false,
                CREATE_NO_WINDOW | CREATE_UNICODE_ENVIRONMENT,
                Some(environment.0 as *const c_void),
                PCWSTR::null(),
                &startup,
                &mut process,
            )
        }
        .map_err(|e| UpdaterError::ProcessCreation(format!("CreateProcessAsUserW: {}", e)))?;

        let _process = OwnedHandle(process.hProcess);
        let _thread = OwnedHandle(process.hThread);
        info!("Started process {} in session {}", process.dwProcessId, session_id);
        Ok(())
    }
}
