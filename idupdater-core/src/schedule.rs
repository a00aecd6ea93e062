//! Recurring update check scheduling
//!
//! The task definition (trigger cadence, settings, action) is computed here;
//! storing it in the OS scheduler is left to a [`SchedulerBackend`].

use crate::error::{Result, UpdaterError};
use chrono::{Datelike, NaiveDateTime, Weekday};
use log::{error, info, warn};
use std::fmt;
use std::path::PathBuf;

/// Argument that marks a scheduler-initiated run
pub const TASK_ARGUMENT: &str = "-task";

/// Account the task is registered under
pub const TASK_PRINCIPAL: &str = "SYSTEM";

/// Start boundary format understood by the scheduler
const START_BOUNDARY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Scheduled check cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Removed,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Daily => write!(f, "DAILY"),
            Interval::Weekly => write!(f, "WEEKLY"),
            Interval::Monthly => write!(f, "MONTHLY"),
            Interval::Removed => write!(f, "REMOVED"),
        }
    }
}

/// Trigger type as reported by the platform scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Daily,
    Weekly,
    Monthly,
    /// Any other platform trigger type
    Other(i32),
}

/// When the task fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub kind: TriggerType,
    pub start_boundary: NaiveDateTime,
    /// Scheduler day-of-week mask (Sunday = bit 0) for weekly triggers
    pub days_of_week: Option<i16>,
    /// Scheduler day-of-month mask (1st = bit 0) for monthly triggers
    pub days_of_month: Option<i32>,
}

impl Trigger {
    /// Trigger of the requested cadence anchored at `now`
    pub fn anchored_at(interval: Interval, now: NaiveDateTime) -> Option<Self> {
        let (kind, days_of_week, days_of_month) = match interval {
            Interval::Daily => (TriggerType::Daily, None, None),
            Interval::Weekly => (TriggerType::Weekly, Some(weekday_mask(now.weekday())), None),
            Interval::Monthly => (TriggerType::Monthly, None, Some(1i32 << (now.day() - 1))),
            Interval::Removed => return None,
        };

        Some(Self {
            kind,
            start_boundary: now,
            days_of_week,
            days_of_month,
        })
    }

    /// Start boundary in the scheduler's timestamp format
    pub fn start_boundary_string(&self) -> String {
        self.start_boundary.format(START_BOUNDARY_FORMAT).to_string()
    }
}

fn weekday_mask(day: Weekday) -> i16 {
    1i16 << day.num_days_from_sunday()
}

/// Scheduler settings of the task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub start_when_available: bool,
    pub run_only_if_network_available: bool,
    pub disallow_start_if_on_batteries: bool,
    pub stop_if_going_on_batteries: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            start_when_available: true,
            run_only_if_network_available: true,
            disallow_start_if_on_batteries: false,
            stop_if_going_on_batteries: false,
        }
    }
}

/// Program the task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAction {
    pub command: PathBuf,
    pub arguments: Vec<String>,
}

/// Complete task definition handed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub principal: String,
    pub settings: TaskSettings,
    pub trigger: Trigger,
    pub action: TaskAction,
}

/// OS scheduler storage
pub trait SchedulerBackend {
    /// Register the task, replacing any task with the same name
    fn register(&self, task: &TaskDefinition) -> Result<()>;

    /// Type of the first trigger of the named task
    fn trigger_type(&self, name: &str) -> Result<TriggerType>;

    /// Delete the named task, [`UpdaterError::TaskNotFound`] if it is absent
    fn delete(&self, name: &str) -> Result<()>;
}

/// Creates, queries and removes the recurring update check
pub struct ScheduleManager<B: SchedulerBackend> {
    backend: B,
    task_name: String,
    program: PathBuf,
}

impl<B: SchedulerBackend> ScheduleManager<B> {
    pub fn new(backend: B, task_name: impl Into<String>, program: PathBuf) -> Self {
        Self {
            backend,
            task_name: task_name.into(),
            program,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build the task definition for `interval` anchored at `now`
    pub fn definition(
        &self,
        interval: Interval,
        extra_args: &[String],
        now: NaiveDateTime,
    ) -> Result<TaskDefinition> {
        let trigger = Trigger::anchored_at(interval, now).ok_or_else(|| {
            UpdaterError::Scheduling("cannot build a trigger for REMOVED".to_string())
        })?;

        let mut arguments = vec![TASK_ARGUMENT.to_string()];
        arguments.extend(extra_args.iter().filter(|a| a.as_str() != TASK_ARGUMENT).cloned());

        Ok(TaskDefinition {
            name: self.task_name.clone(),
            principal: TASK_PRINCIPAL.to_string(),
            settings: TaskSettings::default(),
            trigger,
            action: TaskAction {
                command: self.program.clone(),
                arguments,
            },
        })
    }

    /// Create or update the task at the current local time
    pub fn configure(&self, interval: Interval, extra_args: &[String]) -> bool {
        self.configure_at(interval, extra_args, chrono::Local::now().naive_local())
    }

    /// Create or update the task anchored at `now`
    pub fn configure_at(&self, interval: Interval, extra_args: &[String], now: NaiveDateTime) -> bool {
        if interval == Interval::Removed {
            return self.remove();
        }

        let result = self
            .definition(interval, extra_args, now)
            .and_then(|task| self.backend.register(&task).map(|_| task));

        match result {
            Ok(task) => {
                info!(
                    "Scheduled '{}' {} from {}",
                    task.name,
                    interval,
                    task.trigger.start_boundary_string()
                );
                true
            }
            Err(e) => {
                error!("Failed to schedule '{}' {}: {}", self.task_name, interval, e);
                false
            }
        }
    }

    /// Current cadence of the task, `Removed` if it is absent or unreadable
    pub fn status(&self) -> Interval {
        match self.backend.trigger_type(&self.task_name) {
            Ok(TriggerType::Weekly) => Interval::Weekly,
            Ok(TriggerType::Monthly) => Interval::Monthly,
            Ok(TriggerType::Daily) => Interval::Daily,
            Ok(TriggerType::Other(raw)) => {
                warn!("Task '{}' has unexpected trigger type {}, reporting DAILY", self.task_name, raw);
                Interval::Daily
            }
            Err(e) => {
                info!("Task '{}' not readable: {}", self.task_name, e);
                Interval::Removed
            }
        }
    }

    /// Delete the task; an absent task counts as removed
    pub fn remove(&self) -> bool {
        match self.backend.delete(&self.task_name) {
            Ok(()) => {
                info!("Removed scheduled task '{}'", self.task_name);
                true
            }
            Err(UpdaterError::TaskNotFound(_)) => {
                info!("Scheduled task '{}' was not registered", self.task_name);
                true
            }
            Err(e) => {
                error!("Failed to remove scheduled task '{}': {}", self.task_name, e);
                false
            }
        }
    }
}
