//! Message box front end for runs without a console

use crate::handles::wide;
use idupdater_core::updater::UpdateObserver;
use log::{debug, info};
use windows::core::PCWSTR;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, IDYES, MB_ICONERROR, MB_ICONINFORMATION, MB_ICONQUESTION, MB_OK,
    MB_SETFOREGROUND, MB_YESNO, MESSAGEBOX_RESULT, MESSAGEBOX_STYLE,
};

const TITLE: &str = "ID-software updater";

fn message_box(text: &str, style: MESSAGEBOX_STYLE) -> MESSAGEBOX_RESULT {
    let text = wide(text);
    let title = wide(TITLE);
    unsafe {
        MessageBoxW(
            HWND::default(),
            PCWSTR(text.as_ptr()),
            PCWSTR(title.as_ptr()),
            style | MB_SETFOREGROUND,
        )
    }
}

/// Shows errors and side messages as message boxes; status lines go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogObserver;

impl DialogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl UpdateObserver for DialogObserver {
    fn on_status(&self, text: &str) {
        info!("{}", text);
    }

    fn on_error(&self, text: &str) {
        message_box(&format!("Failed: {}", text), MB_OK | MB_ICONERROR);
    }

    fn on_message(&self, text: &str) {
        message_box(text, MB_OK | MB_ICONINFORMATION);
    }

    fn on_download_progress(&self, received: u64, total: u64) {
        debug!("Downloaded {} of {} bytes", received, total);
    }
}

/// Offer `version` for installation; only Yes accepts
pub fn confirm_install(version: &str) -> bool {
    let answer = message_box(
        &format!(
            "Update is available\nVersion {}\n\nStart downloading and install it now?",
            version
        ),
        MB_YESNO | MB_ICONQUESTION,
    );
    let accepted = answer == IDYES;
    info!("User {} the update offer", if accepted { "accepted" } else { "declined" });
    accepted
}
