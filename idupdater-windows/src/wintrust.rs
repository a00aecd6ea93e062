//! Authenticode inspection through CryptoAPI and WinTrust

use crate::handles::{from_wide, wide};
use idupdater_core::error::{Result, UpdaterError};
use idupdater_core::trust::{SignatureInspector, SignerCertificate};
use log::{debug, warn};
use std::ffi::c_void;
use std::path::Path;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Security::Cryptography::{
    CertCloseStore, CertFindCertificateInStore, CertFreeCertificateContext, CertGetNameStringW,
    CryptMsgClose, CryptMsgGetParam, CryptQueryObject, CERT_CONTEXT, CERT_FIND_SUBJECT_CERT,
    CERT_INFO, CERT_NAME_SIMPLE_DISPLAY_TYPE, CERT_QUERY_CONTENT_FLAG_PKCS7_SIGNED_EMBED,
    CERT_QUERY_ENCODING_TYPE, CERT_QUERY_FORMAT_FLAG_BINARY, CERT_QUERY_OBJECT_FILE,
    CMSG_SIGNER_CERT_INFO_PARAM, HCERTSTORE,
};
use windows::Win32::Security::WinTrust::{
    WinVerifyTrust, WINTRUST_ACTION_GENERIC_VERIFY_V2, WINTRUST_DATA, WINTRUST_DATA_0,
    WINTRUST_FILE_INFO, WTD_CHOICE_FILE, WTD_REVOKE_NONE, WTD_SAFER_FLAG, WTD_STATEACTION_CLOSE,
    WTD_STATEACTION_VERIFY, WTD_UI_ALL, WTD_UI_NONE,
};

struct CertStore(HCERTSTORE);

impl Drop for CertStore {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CertCloseStore(self.0, 0);
            }
        }
    }
}

struct CryptMsg(*mut c_void);

impl Drop for CryptMsg {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                let _ = CryptMsgClose(Some(self.0));
            }
        }
    }
}

struct CertContext(*mut CERT_CONTEXT);

impl Drop for CertContext {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                let _ = CertFreeCertificateContext(Some(self.0));
            }
        }
    }
}

/// WinTrust-backed signature inspector
#[derive(Debug, Default, Clone, Copy)]
pub struct WinTrustInspector;

impl WinTrustInspector {
    pub fn new() -> Self {
        Self
    }
}

fn display_name(cert: *const CERT_CONTEXT) -> String {
    unsafe {
        let len = CertGetNameStringW(cert, CERT_NAME_SIMPLE_DISPLAY_TYPE, 0, None, None);
        if len <= 1 {
            return String::new();
        }
        let mut buf = vec![0u16; len as usize];
        CertGetNameStringW(cert, CERT_NAME_SIMPLE_DISPLAY_TYPE, 0, None, Some(&mut buf));
        from_wide(&buf)
    }
}

impl SignatureInspector for WinTrustInspector {
    fn signer_certificate(&self, package: &Path) -> Result<SignerCertificate> {
        let path = wide(&package.to_string_lossy());
        let mut encoding = CERT_QUERY_ENCODING_TYPE::default();
        let mut store = HCERTSTORE::default();
        let mut msg: *mut c_void = std::ptr::null_mut();

        unsafe {
            CryptQueryObject(
                CERT_QUERY_OBJECT_FILE,
                path.as_ptr() as *const c_void,
                CERT_QUERY_CONTENT_FLAG_PKCS7_SIGNED_EMBED,
                CERT_QUERY_FORMAT_FLAG_BINARY,
                0,
                Some(&mut encoding),
                None,
                None,
                Some(&mut store),
                Some(&mut msg),
                None,
            )
        }
        .map_err(|e| UpdaterError::TrustVerification(format!("no embedded signature: {}", e)))?;

        let store = CertStore(store);
        let msg = CryptMsg(msg);

        let mut size = 0u32;
        unsafe { CryptMsgGetParam(msg.0, CMSG_SIGNER_CERT_INFO_PARAM, 0, None, &mut size) }
            .map_err(|e| UpdaterError::TrustVerification(format!("no signer info: {}", e)))?;

        let mut info = vec![0u8; size as usize];
        unsafe {
            CryptMsgGetParam(
                msg.0,
                CMSG_SIGNER_CERT_INFO_PARAM,
                0,
                Some(info.as_mut_ptr() as *mut c_void),
                &mut size,
            )
        }
        .map_err(|e| UpdaterError::TrustVerification(format!("no signer info: {}", e)))?;

        let cert = CertContext(unsafe {
            CertFindCertificateInStore(
                store.0,
                encoding,
                0,
                CERT_FIND_SUBJECT_CERT,
                Some(info.as_ptr() as *const CERT_INFO as *const c_void),
                None,
            )
        });
        if cert.0.is_null() {
            return Err(UpdaterError::TrustVerification(
                "signer certificate not found in signature".to_string(),
            ));
        }

        let der = unsafe {
            let ctx = &*cert.0;
            std::slice::from_raw_parts(ctx.pbCertEncoded, ctx.cbCertEncoded as usize).to_vec()
        };
        let subject = display_name(cert.0);
        debug!("Package signer: {} ({} byte certificate)", subject, der.len());

        Ok(SignerCertificate { der, subject })
    }

    fn verify_signature(&self, package: &Path, interactive: bool) -> Result<()> {
        let path = wide(&package.to_string_lossy());
        let mut file_info = WINTRUST_FILE_INFO {
            cbStruct: std::mem::size_of::<WINTRUST_FILE_INFO>() as u32,
            pcwszFilePath: PCWSTR(path.as_ptr()),
            hFile: HANDLE::default(),
            pgKnownSubject: std::ptr::null_mut(),
        };

        let mut data = WINTRUST_DATA {
            cbStruct: std::mem::size_of::<WINTRUST_DATA>() as u32,
            dwUIChoice: if interactive { WTD_UI_ALL } else { WTD_UI_NONE },
            fdwRevocationChecks: WTD_REVOKE_NONE,
            dwUnionChoice: WTD_CHOICE_FILE,
            Anonymous: WINTRUST_DATA_0 {
                pFile: &mut file_info,
            },
            dwStateAction: WTD_STATEACTION_VERIFY,
            dwProvFlags: WTD_SAFER_FLAG,
            ..Default::default()
        };

        let mut action: GUID = WINTRUST_ACTION_GENERIC_VERIFY_V2;
        let status = unsafe {
            WinVerifyTrust(
                HWND::default(),
                &mut action,
                &mut data as *mut WINTRUST_DATA as *mut c_void,
            )
        };

        data.dwStateAction = WTD_STATEACTION_CLOSE;
        unsafe {
            WinVerifyTrust(
                HWND::default(),
                &mut action,
                &mut data as *mut WINTRUST_DATA as *mut c_void,
            );
        }

        if status == 0 {
            Ok(())
        } else {
            warn!("WinVerifyTrust returned 0x{:08X}", status as u32);
            Err(UpdaterError::TrustVerification(format!(
                "WinVerifyTrust failed with 0x{:08X}",
                status as u32
            )))
        }
    }
}
