//! Shared plumbing for internal journeys (return home, recharge, lockdown).
//!
//! A journey is a single-task mission the supervisor starts on its own
//! behalf. It is dispatched through the same handoff mailbox as a user
//! mission and monitored the same way; failed journeys are re-dispatched up
//! to `journey_retry_limit` times before the caller escalates.

use tracing::{error, warn};

use crate::error::ErrorMessage;
use crate::machine::context::MachineContext;
use crate::models::{Mission, MissionStatus, Task, TaskType};

#[derive(Debug)]
pub(crate) enum JourneyOutcome {
    /// Still driving (or a retry was just dispatched).
    Pending,
    Succeeded,
    /// Retries exhausted; the caller escalates to intervention.
    Failed(ErrorMessage),
}

pub(crate) struct Journey {
    label: &'static str,
    task: TaskType,
    attempts: u32,
}

impl Journey {
    pub fn new(label: &'static str, task: TaskType) -> Self {
        Self {
            label,
            task,
            attempts: 0,
        }
    }

    /// Install a fresh journey mission as the active mission and hand it to
    /// the robot service.
    pub fn dispatch(&mut self, ctx: &mut MachineContext) {
        let mission = Mission::new(self.label, vec![Task::new(self.task.clone())]);
        ctx.mission = Some(mission);
        ctx.set_mission_status(MissionStatus::InProgress);
        ctx.handoff_active_mission(None);
    }

    fn retry_or_fail(&mut self, ctx: &mut MachineContext, error: ErrorMessage) -> JourneyOutcome {
        self.attempts += 1;
        if self.attempts <= ctx.config.journey_retry_limit {
            warn!(journey = self.label, error = %error, attempts = self.attempts,
                "Journey failed, re-dispatching");
            ctx.events.poller_reset.trigger(());
            self.dispatch(ctx);
            JourneyOutcome::Pending
        } else {
            error!(journey = self.label, error = %error, attempts = self.attempts,
                "Journey failed terminally");
            JourneyOutcome::Failed(error)
        }
    }

    /// Drain the robot-side mailboxes for this tick and report how the
    /// journey is doing.
    pub fn poll(&mut self, ctx: &mut MachineContext) -> JourneyOutcome {
        if let Some(Err(e)) = ctx.events.initiate_ack.try_consume() {
            return self.retry_or_fail(ctx, e);
        }

        if let Some(update) = ctx.events.task_status.try_consume() {
            ctx.apply_task_update(update);
            if ctx.mission.as_ref().is_some_and(|m| m.all_tasks_finished()) {
                let derived = ctx
                    .mission
                    .as_ref()
                    .map(|m| m.derive_terminal_status())
                    .unwrap_or(MissionStatus::Failed);
                ctx.set_mission_status(derived);
                ctx.events.poller_reset.trigger(());
                if derived == MissionStatus::Successful {
                    return JourneyOutcome::Succeeded;
                }
                let e = ctx
                    .mission
                    .as_ref()
                    .and_then(|m| m.tasks.first())
                    .and_then(|t| t.error.clone())
                    .unwrap_or_else(|| ErrorMessage::action_failure("journey task failed"));
                return self.retry_or_fail(ctx, e);
            }
        }

        if let Some(update) = ctx.events.mission_status.try_consume() {
            let active_id = ctx.mission.as_ref().map(|m| m.id);
            if Some(update.mission_id) != active_id {
                warn!(mission_id = %update.mission_id, "Mission status for inactive journey");
                return JourneyOutcome::Pending;
            }
            match update.status {
                MissionStatus::Successful => {
                    ctx.complete_unfinished_tasks();
                    ctx.set_mission_status(MissionStatus::Successful);
                    ctx.events.poller_reset.trigger(());
                    return JourneyOutcome::Succeeded;
                }
                MissionStatus::Failed | MissionStatus::Cancelled => {
                    let e = update
                        .error
                        .unwrap_or_else(|| ErrorMessage::action_failure("journey did not complete"));
                    ctx.fail_unfinished_tasks(e.clone());
                    ctx.set_mission_status(MissionStatus::Failed);
                    ctx.events.poller_reset.trigger(());
                    return self.retry_or_fail(ctx, e);
                }
                MissionStatus::Paused
                | MissionStatus::InProgress
                | MissionStatus::NotStarted
                | MissionStatus::PartiallySuccessful => {}
            }
        }

        JourneyOutcome::Pending
    }
}
