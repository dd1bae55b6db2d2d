//! Monitor: a mission is executing on the robot.

use tracing::{debug, error, info, warn};

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{
    go, AwaitNextMission, InterventionNeeded, NextState, Pausing, State, StopContinuation,
    Stopping,
};
use crate::models::{MissionStatus, Pose};

/// Watches task/mission status while the robot executes the active mission.
pub struct Monitor {
    initial_pose: Option<Pose>,
    /// Whether the mission was already handed to the robot. False on first
    /// entry, true when re-entered after a failed stop or a resume.
    initiated: bool,
    initiate_attempts: u32,
}

impl Monitor {
    /// First entry: the mission will be handed off on enter.
    pub fn new(initial_pose: Option<Pose>) -> Self {
        Self {
            initial_pose,
            initiated: false,
            initiate_attempts: 0,
        }
    }

    /// Re-entry into an already-initiated mission (after a resume or a
    /// failed stop); does not hand the mission off again.
    pub fn reenter() -> Self {
        Self {
            initial_pose: None,
            initiated: true,
            initiate_attempts: 0,
        }
    }

    /// Mission finished from the task side: derive the terminal status and
    /// leave Monitor.
    fn finalize(&self, ctx: &mut MachineContext) -> Option<NextState> {
        let derived = ctx.mission.as_ref()?.derive_terminal_status();
        ctx.set_mission_status(derived);
        info!(status = ?derived, "Mission finished");
        ctx.events.poller_reset.trigger(());
        ctx.drop_mission();
        if derived == MissionStatus::Failed {
            go(InterventionNeeded::new())
        } else {
            go(AwaitNextMission::new())
        }
    }
}

impl State for Monitor {
    fn name(&self) -> &'static str {
        "Monitor"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        if ctx.mission.as_ref().map(|m| m.status) != Some(MissionStatus::InProgress) {
            ctx.set_mission_status(MissionStatus::InProgress);
        }
        if !self.initiated {
            ctx.handoff_active_mission(self.initial_pose);
            self.initiated = true;
        }
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("a mission is already running".into()));
        }

        if let Some(requested_id) = ctx.events.stop_mission.try_consume() {
            let active_id = ctx.mission.as_ref().map(|m| m.id);
            if requested_id.is_some() && requested_id != active_id {
                ctx.reject(
                    &ctx.events.stop_mission_ack,
                    ErrorMessage::no_mission_running("mission id does not match the active mission"),
                );
            } else {
                return go(Stopping::new(StopContinuation::Idle, false));
            }
        }

        if ctx.events.pause_mission.try_consume().is_some() {
            return go(Pausing::new());
        }

        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(Stopping::new(StopContinuation::Maintenance, false))
                }
                ModeRequest::Release => ctx
                    .events
                    .maintenance_mode_ack
                    .trigger(Ack::Conflict("not in maintenance mode".into())),
            }
        }

        if let Some(request) = ctx.events.lockdown.try_consume() {
            match request {
                ModeRequest::Enter => return go(Stopping::new(StopContinuation::Lockdown, false)),
                ModeRequest::Release => ctx
                    .events
                    .lockdown_ack
                    .trigger(Ack::Conflict("not in lockdown".into())),
            }
        }

        if ctx.events.return_home.try_consume().is_some() {
            ctx.events
                .return_home_ack
                .trigger(Ack::Conflict("a mission is running".into()));
        }

        if let Some(result) = ctx.events.initiate_ack.try_consume() {
            match result {
                Ok(()) => debug!("Mission initiated on the robot"),
                Err(e) => {
                    self.initiate_attempts += 1;
                    if self.initiate_attempts > ctx.config.initiate_retry_limit {
                        error!(error = %e, attempts = self.initiate_attempts,
                            "Mission initiation failed terminally");
                        ctx.fail_unfinished_tasks(e.clone());
                        let derived = ctx
                            .mission
                            .as_ref()
                            .map(|m| m.derive_terminal_status())
                            .unwrap_or(MissionStatus::Failed);
                        ctx.set_mission_error(e);
                        ctx.set_mission_status(derived);
                        ctx.drop_mission();
                        return go(InterventionNeeded::new());
                    }
                    warn!(error = %e, attempts = self.initiate_attempts,
                        "Mission initiation failed, retrying");
                    ctx.handoff_active_mission(self.initial_pose);
                }
            }
        }

        if let Some(update) = ctx.events.task_status.try_consume() {
            ctx.apply_task_update(update);
            if ctx.mission.as_ref().is_some_and(|m| m.all_tasks_finished()) {
                return self.finalize(ctx);
            }
        }

        if let Some(update) = ctx.events.mission_status.try_consume() {
            let active_id = ctx.mission.as_ref().map(|m| m.id);
            if Some(update.mission_id) != active_id {
                warn!(mission_id = %update.mission_id, "Mission status for inactive mission");
                return None;
            }
            match update.status {
                MissionStatus::Successful => {
                    // Coalesced task updates may have been lost; the robot
                    // says everything completed.
                    ctx.complete_unfinished_tasks();
                    return self.finalize(ctx);
                }
                MissionStatus::Failed => {
                    let e = update
                        .error
                        .unwrap_or_else(|| ErrorMessage::unknown("robot reported mission failure"));
                    error!(error = %e, "Robot reported mission failure");
                    ctx.fail_unfinished_tasks(e.clone());
                    let derived = ctx
                        .mission
                        .as_ref()
                        .map(|m| m.derive_terminal_status())
                        .unwrap_or(MissionStatus::Failed);
                    ctx.set_mission_error(e);
                    ctx.set_mission_status(derived);
                    ctx.events.poller_reset.trigger(());
                    ctx.drop_mission();
                    return go(InterventionNeeded::new());
                }
                MissionStatus::Cancelled => {
                    warn!("Robot reports mission cancelled outside a stop flow");
                    if let Some(mission) = ctx.mission.as_mut() {
                        mission.cancel_unfinished_tasks();
                    }
                    ctx.set_mission_status(MissionStatus::Cancelled);
                    ctx.drop_mission();
                    return go(AwaitNextMission::new());
                }
                MissionStatus::Paused
                | MissionStatus::InProgress
                | MissionStatus::NotStarted
                | MissionStatus::PartiallySuccessful => {}
            }
        }

        if let Some(status) = ctx.events.robot_status.try_consume() {
            // Status degradation mid-mission surfaces through task/mission
            // polling failures; the raw status change is only logged here.
            debug!(?status, "Robot status changed mid-mission");
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReason;
    use crate::events::{MissionStatusUpdate, TaskStatusUpdate};
    use crate::machine::test_support::test_context;
    use crate::models::{Mission, Task, TaskStatus, TaskType};

    fn context_with_mission() -> (MachineContext, crate::telemetry::TelemetryReceiver, Mission) {
        let (mut ctx, rx) = test_context();
        let mission = Mission::new(
            "inspect",
            vec![
                Task::new(TaskType::TakeImage {
                    target: crate::models::Pose::default(),
                }),
                Task::new(TaskType::ReturnToHome),
            ],
        );
        ctx.mission = Some(mission.clone());
        (ctx, rx, mission)
    }

    #[test]
    fn on_enter_hands_mission_off_once() {
        let (mut ctx, _rx, _mission) = context_with_mission();
        let mut monitor = Monitor::new(None);
        monitor.on_enter(&mut ctx);
        assert!(ctx.events.mission_handoff.has_event());

        ctx.events.mission_handoff.clear();
        let mut reentered = Monitor::reenter();
        reentered.on_enter(&mut ctx);
        assert!(!ctx.events.mission_handoff.has_event());
    }

    #[test]
    fn all_tasks_successful_finalizes_to_await_next_mission() {
        let (mut ctx, _rx, mission) = context_with_mission();
        let mut monitor = Monitor::reenter();

        ctx.events.task_status.trigger(TaskStatusUpdate {
            task_id: mission.tasks[0].id,
            status: TaskStatus::Successful,
            error: None,
        });
        assert!(monitor.step(&mut ctx).is_none());

        ctx.events.task_status.trigger(TaskStatusUpdate {
            task_id: mission.tasks[1].id,
            status: TaskStatus::Successful,
            error: None,
        });
        let next = monitor.step(&mut ctx).expect("finalize");
        assert_eq!(next.name(), "AwaitNextMission");
        assert!(ctx.mission.is_none());
    }

    #[test]
    fn robot_mission_success_completes_coalesced_tasks() {
        let (mut ctx, mut rx, mission) = context_with_mission();
        let mut monitor = Monitor::reenter();

        ctx.events.mission_status.trigger(MissionStatusUpdate {
            mission_id: mission.id,
            status: MissionStatus::Successful,
            error: None,
        });
        let next = monitor.step(&mut ctx).expect("finalize");
        assert_eq!(next.name(), "AwaitNextMission");
        // The inspection task was completed implicitly and uploaded.
        let upload = rx.uploads.try_recv().expect("one upload");
        assert_eq!(upload.mission_id, mission.id);
    }

    #[test]
    fn initiate_failure_retries_then_escalates() {
        let (mut ctx, _rx, _mission) = context_with_mission();
        ctx.config.initiate_retry_limit = 1;
        let mut monitor = Monitor::new(None);
        monitor.on_enter(&mut ctx);
        ctx.events.mission_handoff.clear();

        ctx.events
            .initiate_ack
            .trigger(Err(ErrorMessage::infeasible("no path")));
        assert!(monitor.step(&mut ctx).is_none());
        // Retry re-handed the mission off.
        assert!(ctx.events.mission_handoff.has_event());

        ctx.events
            .initiate_ack
            .trigger(Err(ErrorMessage::infeasible("no path")));
        let next = monitor.step(&mut ctx).expect("escalation");
        assert_eq!(next.name(), "InterventionNeeded");
        assert!(ctx.mission.is_none());
    }

    #[test]
    fn stop_request_moves_to_stopping() {
        let (mut ctx, _rx, _mission) = context_with_mission();
        let mut monitor = Monitor::reenter();
        ctx.events.stop_mission.trigger(None);
        let next = monitor.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "Stopping");
    }

    #[test]
    fn stop_with_wrong_mission_id_is_rejected() {
        let (mut ctx, _rx, _mission) = context_with_mission();
        let mut monitor = Monitor::reenter();
        ctx.events
            .stop_mission
            .trigger(Some(uuid::Uuid::new_v4()));
        assert!(monitor.step(&mut ctx).is_none());
        match ctx.events.stop_mission_ack.try_consume() {
            Some(Ack::Rejected(e)) => assert_eq!(e.reason, ErrorReason::NoMissionRunning),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn second_start_gets_conflict_ack() {
        let (mut ctx, _rx, _mission) = context_with_mission();
        let mut monitor = Monitor::reenter();
        ctx.events.start_mission.trigger(crate::events::StartMissionRequest {
            mission: Mission::new("other", vec![]),
            initial_pose: None,
        });
        assert!(monitor.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.start_mission_ack.try_consume(),
            Some(Ack::Conflict(_))
        ));
    }
}
