// Updater runs from a console, the scheduler or the installer

#[cfg(windows)]
use anyhow::Context;
#[cfg(windows)]
use idupdater_core::config::{config_source, user_agent};
#[cfg(windows)]
use idupdater_core::schedule::{Interval, ScheduleManager};
#[cfg(windows)]
use idupdater_core::session::{command_line, run_in_session};
#[cfg(windows)]
use idupdater_core::settings::{self, UpdaterSettings};
#[cfg(windows)]
use idupdater_core::trust::TrustVerifier;
#[cfg(windows)]
use idupdater_core::updater::{
    Collaborators, HttpTransport, MsiInstaller, Outcome, ProductRegistry, UpdateObserver, UpdateOrchestrator,
    WindowFactory,
};
#[cfg(windows)]
use idupdater_core::utils::rotate_log_if_needed;
#[cfg(windows)]
use idupdater_windows::cli::{Cli, Command, HELP_TEXT, SCHEDULE_FAILED};
#[cfg(windows)]
use idupdater_windows::console::{prompt_accept, ConsoleObserver, Presentation};
#[cfg(windows)]
use idupdater_windows::dialog::confirm_install;
#[cfg(windows)]
use idupdater_windows::{
    ComTaskScheduler, DialogObserver, MsiProductRegistry, WinTrustInspector, WtsSessionLauncher,
};
#[cfg(windows)]
use log::{error, info, warn};
#[cfg(windows)]
use std::io::IsTerminal;
#[cfg(windows)]
use std::panic;
#[cfg(windows)]
use std::sync::Arc;
#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
#[cfg(windows)]
use windows::Win32::System::Console::GetConsoleWindow;
#[cfg(windows)]
use windows::Win32::System::Threading::CreateMutexA;

/// RAII wrapper for the single-instance mutex
#[cfg(windows)]
struct SingleInstanceGuard {
    handle: HANDLE,
}

#[cfg(windows)]
impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

/// Try to acquire the single-instance mutex
/// Returns None if another updater is already running in this session
#[cfg(windows)]
fn try_acquire_single_instance() -> Option<SingleInstanceGuard> {
    unsafe {
        match CreateMutexA(None, true, windows::core::s!("id-updater_SingleInstance_Mutex")) {
            Ok(h) => {
                if GetLastError() == ERROR_ALREADY_EXISTS {
                    let _ = CloseHandle(h);
                    None
                } else {
                    Some(SingleInstanceGuard { handle: h })
                }
            }
            Err(e) => {
                warn!("Failed to create single-instance mutex: {}", e);
                None
            }
        }
    }
}

/// Set up crash logging to capture panics
#[cfg(windows)]
fn setup_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);

        let crash_dir = settings::data_dir();
        let _ = std::fs::create_dir_all(&crash_dir);
        let crash_file = crash_dir.join("crash.log");
        let crash_info = format!(
            "[{}] PANIC at {}: {}\nBacktrace (if RUST_BACKTRACE=1):\n{:?}\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            location,
            message,
            std::backtrace::Backtrace::capture()
        );
        if std::fs::write(&crash_file, &crash_info).is_ok() {
            eprintln!("Crash log written to: {}", crash_file.display());
        }
    }));
}

#[cfg(windows)]
fn init_logging() {
    let log_dir = settings::data_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file_path = log_dir.join("id-updater.log");

    if let Err(e) = rotate_log_if_needed(&log_file_path) {
        eprintln!("Failed to rotate log file: {}", e);
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|_| log::LevelFilter::Debug)
        .unwrap_or(log::LevelFilter::Info);

    if let Ok(log_file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
    {
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_millis()
            .init();
    }

    info!("========================================");
    info!("Starting id-updater v{}", env!("CARGO_PKG_VERSION"));
    info!("Log file: {}", log_file_path.display());
}

#[cfg(windows)]
fn schedule(cli: &Cli, settings: &UpdaterSettings, interval: Interval) -> anyhow::Result<i32> {
    let exe = std::env::current_exe().context("Failed to get current exe path")?;
    let manager = ScheduleManager::new(ComTaskScheduler::new(), settings.task_name.as_str(), exe);
    if manager.configure(interval, &cli.task_arguments()) {
        Ok(0)
    } else {
        eprintln!("{}", SCHEDULE_FAILED);
        Ok(1)
    }
}

#[cfg(windows)]
fn status(settings: &UpdaterSettings) -> anyhow::Result<i32> {
    let exe = std::env::current_exe().context("Failed to get current exe path")?;
    let manager = ScheduleManager::new(ComTaskScheduler::new(), settings.task_name.as_str(), exe);
    println!("{}", manager.status());
    Ok(0)
}

#[cfg(windows)]
fn relaunch_in_session(cli: &Cli) -> anyhow::Result<i32> {
    let exe = std::env::current_exe().context("Failed to get current exe path")?;
    let command = command_line(&exe, &cli.session_arguments());
    Ok(if run_in_session(&WtsSessionLauncher::new(), &command) { 0 } else { 1 })
}

#[cfg(windows)]
fn presentation() -> Presentation {
    let has_console_window = !unsafe { GetConsoleWindow() }.0.is_null();
    Presentation::detect(std::io::stdin().is_terminal(), has_console_window)
}

#[cfg(windows)]
fn check(settings: &UpdaterSettings, autoupdate: bool, autoclose: bool, manual: bool) -> anyhow::Result<i32> {
    let _instance_guard = match try_acquire_single_instance() {
        Some(guard) => guard,
        None => {
            info!("Another instance of id-updater is already running. Exiting.");
            return Ok(0);
        }
    };

    let products = Arc::new(MsiProductRegistry::new());
    let installed = products
        .installed_version(&settings.default_upgrade_code)
        .unwrap_or_default();
    let agent = user_agent(&installed, manual);

    let collaborators = Collaborators {
        config: config_source(&settings.config_url, &agent),
        products,
        transport: Arc::new(HttpTransport::in_temp_dir(&agent)?),
        verifier: TrustVerifier::new(Arc::new(WinTrustInspector::new())),
        installer: Arc::new(MsiInstaller::new(&settings.install_log_name)),
        default_upgrade_code: settings.default_upgrade_code.clone(),
    };

    let presentation = presentation();
    info!("Presenting through {:?}", presentation);
    let window_factory: WindowFactory = match presentation {
        Presentation::Console => Box::new(|| Arc::new(ConsoleObserver::stdout()) as Arc<dyn UpdateObserver>),
        Presentation::Dialog => Box::new(|| Arc::new(DialogObserver::new()) as Arc<dyn UpdateObserver>),
    };
    let orchestrator = UpdateOrchestrator::new(collaborators).with_window_factory(window_factory);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let mut outcome = rt.block_on(orchestrator.check_updates(autoupdate, autoclose));

    let state = orchestrator.state();
    if let (Outcome::Continue, true, Some(update)) =
        (outcome, state.is_awaiting_acceptance(), state.get_info())
    {
        let accepted = match presentation {
            Presentation::Console => {
                prompt_accept(std::io::stdin().lock(), std::io::stdout(), &update.available)
            }
            Presentation::Dialog => confirm_install(&update.available),
        };
        outcome = if accepted {
            rt.block_on(orchestrator.accept())
        } else {
            orchestrator.reject()
        };
    }

    Ok(match outcome {
        Outcome::Exit(code) => code,
        Outcome::Continue => {
            if orchestrator.last_error().is_some() {
                1
            } else {
                0
            }
        }
    })
}

#[cfg(windows)]
fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = settings::load_settings();
    info!("Starting updater with arguments {:?}", cli.args);

    match cli.command {
        Command::Help => {
            println!("{}", HELP_TEXT);
            Ok(0)
        }
        Command::Schedule(interval) => schedule(&cli, &settings, interval),
        Command::Status => status(&settings),
        Command::Task => relaunch_in_session(&cli),
        Command::Check {
            autoupdate,
            autoclose,
        } => check(&settings, autoupdate, autoclose, cli.command.is_manual()),
    }
}

#[cfg(windows)]
fn main() {
    setup_panic_hook();
    init_logging();

    let cli = Cli::parse(std::env::args().skip(1));
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };
    info!("Exiting with code {}", code);
    std::process::exit(code);
}

#[cfg(not(windows))]
fn main() {
    eprintln!("id-updater only runs on Windows");
    std::process::exit(1);
}
