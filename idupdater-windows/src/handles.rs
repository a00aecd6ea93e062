//! Owned wrappers for native handles
//!
//! Each guard releases its resource on drop, so early returns never leak.

use windows::core::HRESULT;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::PSECURITY_DESCRIPTOR;
use windows::Win32::System::Com::{
    CoInitializeEx, CoInitializeSecurity, CoUninitialize, COINIT_MULTITHREADED, EOAC_NONE,
    RPC_C_AUTHN_LEVEL_PKT_PRIVACY, RPC_C_IMP_LEVEL_IMPERSONATE,
};

/// Kernel object handle closed with `CloseHandle`
pub struct OwnedHandle(pub HANDLE);

impl OwnedHandle {
    pub fn get(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// COM initialized on the current thread
pub struct ComApartment {
    initialized: bool,
}

impl ComApartment {
    pub fn enter() -> windows::core::Result<Self> {
        let hr: HRESULT = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        // RPC_E_CHANGED_MODE: already initialized with another model, still usable
        if hr.0 == 0x80010106u32 as i32 {
            return Ok(Self { initialized: false });
        }
        hr.ok()?;
        Ok(Self { initialized: true })
    }

    /// Process-wide call security: encrypted packets, impersonating servers
    pub fn secure(&self) -> windows::core::Result<()> {
        let result = unsafe {
            CoInitializeSecurity(
                PSECURITY_DESCRIPTOR::default(),
                -1,
                None,
                None,
                RPC_C_AUTHN_LEVEL_PKT_PRIVACY,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
                None,
            )
        };
        match result {
            // RPC_E_TOO_LATE: security was already set for this process
            Err(e) if e.code().0 == 0x80010119u32 as i32 => Ok(()),
            other => other,
        }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

/// Wide, NUL-terminated copy of `s`
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// String from a NUL-terminated wide buffer
pub fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
