//! Task Scheduler 2.0 backend

use crate::handles::ComApartment;
use idupdater_core::error::{Result, UpdaterError};
use idupdater_core::schedule::{SchedulerBackend, TaskDefinition, TriggerType};
use idupdater_core::session::join_arguments;
use log::{debug, info};
use windows::core::{Interface, BSTR, VARIANT};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, VARIANT_FALSE, VARIANT_TRUE};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER};
use windows::Win32::System::TaskScheduler::{
    IDailyTrigger, IExecAction, IMonthlyTrigger, ITaskFolder, ITaskService, IWeeklyTrigger,
    TaskScheduler, TASK_ACTION_EXEC, TASK_CREATE_OR_UPDATE, TASK_LOGON_SERVICE_ACCOUNT,
    TASK_TRIGGER_DAILY, TASK_TRIGGER_MONTHLY, TASK_TRIGGER_WEEKLY,
};

fn scheduling<E: std::fmt::Display>(step: &'static str) -> impl FnOnce(E) -> UpdaterError {
    move |e| UpdaterError::Scheduling(format!("{}: {}", step, e))
}

/// COM Task Scheduler backend
#[derive(Debug, Default, Clone, Copy)]
pub struct ComTaskScheduler;

impl ComTaskScheduler {
    pub fn new() -> Self {
        Self
    }

    fn root_folder(&self) -> Result<(ComApartment, ITaskService, ITaskFolder)> {
        let apartment = ComApartment::enter().map_err(scheduling("CoInitializeEx"))?;
        apartment.secure().map_err(scheduling("CoInitializeSecurity"))?;
        let service: ITaskService = unsafe { CoCreateInstance(&TaskScheduler, None, CLSCTX_INPROC_SERVER) }
            .map_err(scheduling("Task Scheduler service unavailable"))?;
        unsafe {
            service.Connect(
                &VARIANT::default(),
                &VARIANT::default(),
                &VARIANT::default(),
                &VARIANT::default(),
            )
        }
        .map_err(scheduling("Connect"))?;
        let folder = unsafe { service.GetFolder(&BSTR::from("\\")) }.map_err(scheduling("GetFolder"))?;
        Ok((apartment, service, folder))
    }
}

impl SchedulerBackend for ComTaskScheduler {
    fn register(&self, task: &TaskDefinition) -> Result<()> {
        let (_apartment, service, folder) = self.root_folder()?;

        unsafe {
            let definition = service.NewTask(0).map_err(scheduling("NewTask"))?;

            let settings = definition.Settings().map_err(scheduling("Settings"))?;
            let flag = |on: bool| if on { VARIANT_TRUE } else { VARIANT_FALSE };
            settings
                .SetStartWhenAvailable(flag(task.settings.start_when_available))
                .map_err(scheduling("SetStartWhenAvailable"))?;
            settings
                .SetRunOnlyIfNetworkAvailable(flag(task.settings.run_only_if_network_available))
                .map_err(scheduling("SetRunOnlyIfNetworkAvailable"))?;
            settings
                .SetDisallowStartIfOnBatteries(flag(task.settings.disallow_start_if_on_batteries))
                .map_err(scheduling("SetDisallowStartIfOnBatteries"))?;
            settings
                .SetStopIfGoingOnBatteries(flag(task.settings.stop_if_going_on_batteries))
                .map_err(scheduling("SetStopIfGoingOnBatteries"))?;

            let triggers = definition.Triggers().map_err(scheduling("Triggers"))?;
            let kind = match task.trigger.kind {
                TriggerType::Daily => TASK_TRIGGER_DAILY,
                TriggerType::Weekly => TASK_TRIGGER_WEEKLY,
                TriggerType::Monthly => TASK_TRIGGER_MONTHLY,
                TriggerType::Other(raw) => {
                    return Err(UpdaterError::Scheduling(format!("unsupported trigger type {}", raw)))
                }
            };
            let trigger = triggers.Create(kind).map_err(scheduling("Create trigger"))?;
            trigger
                .SetStartBoundary(&BSTR::from(task.trigger.start_boundary_string()))
                .map_err(scheduling("SetStartBoundary"))?;

            match task.trigger.kind {
                TriggerType::Daily => {
                    let daily: IDailyTrigger = trigger.cast().map_err(scheduling("IDailyTrigger"))?;
                    daily.SetDaysInterval(1).map_err(scheduling("SetDaysInterval"))?;
                }
                TriggerType::Weekly => {
                    let weekly: IWeeklyTrigger = trigger.cast().map_err(scheduling("IWeeklyTrigger"))?;
                    weekly
                        .SetDaysOfWeek(task.trigger.days_of_week.unwrap_or(1))
                        .map_err(scheduling("SetDaysOfWeek"))?;
                    weekly.SetWeeksInterval(1).map_err(scheduling("SetWeeksInterval"))?;
                }
                TriggerType::Monthly => {
                    let monthly: IMonthlyTrigger = trigger.cast().map_err(scheduling("IMonthlyTrigger"))?;
                    monthly
                        .SetDaysOfMonth(task.trigger.days_of_month.unwrap_or(1))
                        .map_err(scheduling("SetDaysOfMonth"))?;
                    monthly.SetMonthsOfYear(0x0FFF).map_err(scheduling("SetMonthsOfYear"))?;
                }
                TriggerType::Other(_) => {}
            }

            let actions = definition.Actions().map_err(scheduling("Actions"))?;
            let action = actions.Create(TASK_ACTION_EXEC).map_err(scheduling("Create action"))?;
            let exec: IExecAction = action.cast().map_err(scheduling("IExecAction"))?;
            exec.SetPath(&BSTR::from(task.action.command.to_string_lossy().as_ref()))
                .map_err(scheduling("SetPath"))?;
            exec.SetArguments(&BSTR::from(join_arguments(&task.action.arguments)))
                .map_err(scheduling("SetArguments"))?;

            debug!("Registering task '{}' as {}", task.name, task.principal);
            folder
                .RegisterTaskDefinition(
                    &BSTR::from(task.name.as_str()),
                    &definition,
                    TASK_CREATE_OR_UPDATE.0,
                    &VARIANT::from(BSTR::from(task.principal.as_str())),
                    &VARIANT::default(),
                    TASK_LOGON_SERVICE_ACCOUNT,
                    &VARIANT::from(BSTR::new()),
                )
                .map_err(scheduling("RegisterTaskDefinition"))?;
        }

        info!("Task '{}' registered", task.name);
        Ok(())
    }

    fn trigger_type(&self, name: &str) -> Result<TriggerType> {
        let (_apartment, _service, folder) = self.root_folder()?;
        unsafe {
            let task = folder.GetTask(&BSTR::from(name)).map_err(scheduling("GetTask"))?;
            let definition = task.Definition().map_err(scheduling("Definition"))?;
            let triggers = definition.Triggers().map_err(scheduling("Triggers"))?;
            let trigger = triggers.get_Item(1).map_err(scheduling("Trigger item"))?;
            let kind = trigger.Type().map_err(scheduling("Trigger type"))?;

            Ok(match kind {
                TASK_TRIGGER_DAILY => TriggerType::Daily,
                TASK_TRIGGER_WEEKLY => TriggerType::Weekly,
                TASK_TRIGGER_MONTHLY => TriggerType::Monthly,
                other => TriggerType::Other(other.0),
            })
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        let (_apartment, _service, folder) = self.root_folder()?;
        unsafe { folder.DeleteTask(&BSTR::from(name), 0) }.map_err(|e| {
            if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
                UpdaterError::TaskNotFound(name.to_string())
            } else {
                scheduling("DeleteTask")(e)
            }
        })
    }
}
