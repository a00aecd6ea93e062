//! Installed product lookup in the Windows Installer database

use crate::handles::{from_wide, wide};
use idupdater_core::updater::ProductRegistry;
use idupdater_core::version;
use log::debug;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::ERROR_SUCCESS;
use windows::Win32::System::ApplicationInstallationAndServicing::{
    MsiEnumRelatedProductsW, MsiGetProductInfoW, INSTALLPROPERTY_VERSIONSTRING,
};

/// Product code buffer: a GUID string plus NUL
const PRODUCT_CODE_LEN: usize = 39;

#[derive(Debug, Default, Clone, Copy)]
pub struct MsiProductRegistry;

impl MsiProductRegistry {
    pub fn new() -> Self {
        Self
    }

    fn related_products(upgrade_code: &str) -> Vec<String> {
        let code = wide(upgrade_code);
        let mut products = Vec::new();
        for index in 0.. {
            let mut buf = [0u16; PRODUCT_CODE_LEN];
            let rc = unsafe {
                MsiEnumRelatedProductsW(PCWSTR(code.as_ptr()), 0, index, PWSTR(buf.as_mut_ptr()))
            };
            if rc != ERROR_SUCCESS.0 {
                break;
            }
            products.push(from_wide(&buf));
        }
        products
    }

    fn product_version(product: &str) -> Option<String> {
        let product = wide(product);
        let mut len = 0u32;
        let rc = unsafe {
            MsiGetProductInfoW(
                PCWSTR(product.as_ptr()),
                INSTALLPROPERTY_VERSIONSTRING,
                PWSTR::null(),
                Some(&mut len),
            )
        };
        if rc != ERROR_SUCCESS.0 {
            return None;
        }

        len += 1;
        let mut buf = vec![0u16; len as usize];
        let rc = unsafe {
            MsiGetProductInfoW(
                PCWSTR(product.as_ptr()),
                INSTALLPROPERTY_VERSIONSTRING,
                PWSTR(buf.as_mut_ptr()),
                Some(&mut len),
            )
        };
        (rc == ERROR_SUCCESS.0).then(|| from_wide(&buf))
    }
}

impl ProductRegistry for MsiProductRegistry {
    fn installed_version(&self, upgrade_code: &str) -> Option<String> {
        Self::related_products(upgrade_code)
            .iter()
            .filter_map(|product| {
                let v = Self::product_version(product);
                debug!("Related product {}: {:?}", product, v);
                v
            })
            .max_by(|a, b| version::compare(a, b))
    }
}
