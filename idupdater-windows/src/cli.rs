//! Command-line dispatch
//!
//! Flags use the single-dash form of the installer's shortcuts
//! (`-autoupdate`, `-daily`, ...) rather than GNU-style options.

use idupdater_core::schedule::{Interval, TASK_ARGUMENT};

pub const HELP_TEXT: &str = "\
ID Updater

  -help         this help
  -autoupdate   update automatically
  -autoclose    close automatically when no updates are available
  -task         execute subprocess to right window session under windows
  -daily|-monthly|-weekly|-remove
                configure scheduled task to run at given interval, or remove it
  -status       print the configured interval
";

pub const SCHEDULE_FAILED: &str =
    "Failed to set schedule, check permissions. Try again with administrator permissions.";

/// Flags that control the scheduled task and are never passed on to it
const SCHEDULING_FLAGS: &[&str] = &["-daily", "-weekly", "-monthly", "-remove", "-status", TASK_ARGUMENT];

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// Configure (or, with `Interval::Removed`, remove) the scheduled task
    Schedule(Interval),
    Status,
    /// Scheduler-initiated run: relaunch in the interactive session
    Task,
    Check { autoupdate: bool, autoclose: bool },
}

impl Command {
    /// Checks that open a window from the start, reported as ` manual`
    pub fn is_manual(&self) -> bool {
        matches!(self, Command::Check { autoclose: false, .. })
    }
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub command: Command,
    /// Arguments as given, without the program name
    pub args: Vec<String>,
}

impl Cli {
    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let has = |flag: &str| args.iter().any(|a| a == flag);

        let command = if has("-help") || has("-?") || has("/?") {
            Command::Help
        } else if has("-daily") {
            Command::Schedule(Interval::Daily)
        } else if has("-weekly") {
            Command::Schedule(Interval::Weekly)
        } else if has("-monthly") {
            Command::Schedule(Interval::Monthly)
        } else if has("-remove") {
            Command::Schedule(Interval::Removed)
        } else if has("-status") {
            Command::Status
        } else if has(TASK_ARGUMENT) {
            Command::Task
        } else {
            Command::Check {
                autoupdate: has("-autoupdate"),
                autoclose: has("-autoclose"),
            }
        };

        Self { command, args }
    }

    /// Arguments stored in the scheduled task after `-task`
    pub fn task_arguments(&self) -> Vec<String> {
        self.args
            .iter()
            .filter(|a| !SCHEDULING_FLAGS.contains(&a.as_str()))
            .cloned()
            .collect()
    }

    /// Arguments for the process started in the user's session
    pub fn session_arguments(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .filter(|a| a.as_str() != TASK_ARGUMENT)
            .cloned()
            .collect();
        if !args.iter().any(|a| a == "-autoclose") {
            args.push("-autoclose".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_help_wins() {
        assert_eq!(parse(&["-daily", "/?"]).command, Command::Help);
        assert_eq!(parse(&["-?"]).command, Command::Help);
    }

    #[test]
    fn test_schedule_flags() {
        assert_eq!(parse(&["-weekly", "-autoupdate"]).command, Command::Schedule(Interval::Weekly));
        assert_eq!(parse(&["-remove"]).command, Command::Schedule(Interval::Removed));
        assert_eq!(parse(&["-monthly", "-status"]).command, Command::Schedule(Interval::Monthly));
        assert_eq!(parse(&["-status"]).command, Command::Status);
    }

    #[test]
    fn test_default_is_check() {
        assert_eq!(
            parse(&[]).command,
            Command::Check {
                autoupdate: false,
                autoclose: false
            }
        );
        assert_eq!(
            parse(&["-autoupdate", "-autoclose"]).command,
            Command::Check {
                autoupdate: true,
                autoclose: true
            }
        );
    }

    #[test]
    fn test_manual_follows_autoclose() {
        assert!(parse(&[]).command.is_manual());
        assert!(parse(&["-autoupdate"]).command.is_manual());
        assert!(!parse(&["-autoclose"]).command.is_manual());
        assert!(!parse(&["-autoupdate", "-autoclose"]).command.is_manual());
        assert!(!parse(&["-task"]).command.is_manual());
    }

    #[test]
    fn test_task_arguments_strip_scheduling_flags() {
        let cli = parse(&["-daily", "-autoupdate", "-task", "-autoclose"]);
        assert_eq!(cli.task_arguments(), vec!["-autoupdate", "-autoclose"]);
    }

    #[test]
    fn test_session_arguments() {
        let cli = parse(&["-task", "-autoupdate"]);
        assert_eq!(cli.command, Command::Task);
        assert_eq!(cli.session_arguments(), vec!["-autoupdate", "-autoclose"]);

        let cli = parse(&["-task", "-autoclose"]);
        assert_eq!(cli.session_arguments(), vec!["-autoclose"]);
    }
}
