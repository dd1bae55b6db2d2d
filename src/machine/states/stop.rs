//! Stopping states: a stop command is in flight.
//!
//! A mid-mission stop always goes through here first: the stop command is
//! issued exactly once and the state waits for its explicit acknowledgement
//! or failure; a stop is never assumed to have succeeded. One struct covers
//! the three catalogue states (`Stopping`, `StoppingPausedMission`,
//! `StoppingDueToMaintenance`); they differ in where the ack goes and where
//! the machine continues afterwards.

use tracing::{error, info, warn};

use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{
    go, AwaitNextMission, GoingToLockdown, InterventionNeeded, Maintenance, Monitor, NextState,
    Paused, ReturningHome, State,
};
use crate::models::MissionStatus;

/// Where the machine goes once the stop is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopContinuation {
    /// Regular stop request: idle afterwards (battery decides where).
    Idle,
    /// Stop because maintenance mode was requested.
    Maintenance,
    /// Stop because a lockdown was requested.
    Lockdown,
}

pub struct Stopping {
    continuation: StopContinuation,
    from_paused: bool,
    attempts: u32,
}

impl Stopping {
    pub fn new(continuation: StopContinuation, from_paused: bool) -> Self {
        Self {
            continuation,
            from_paused,
            attempts: 0,
        }
    }

    fn ack_mailbox<'a>(&self, ctx: &'a MachineContext) -> &'a crate::mailbox::Mailbox<Ack> {
        match self.continuation {
            StopContinuation::Idle => &ctx.events.stop_mission_ack,
            StopContinuation::Maintenance => &ctx.events.maintenance_mode_ack,
            StopContinuation::Lockdown => &ctx.events.lockdown_ack,
        }
    }
}

impl State for Stopping {
    fn name(&self) -> &'static str {
        match (self.continuation, self.from_paused) {
            (StopContinuation::Maintenance, _) => "StoppingDueToMaintenance",
            (_, true) => "StoppingPausedMission",
            _ => "Stopping",
        }
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        // A stale ack from an earlier stop must not satisfy this one.
        ctx.events.stop_ack.clear();
        ctx.events.stop_directive.trigger(());
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        // A second stop while stopping is a no-op: answered, never re-issued.
        if ctx.events.stop_mission.try_consume().is_some() {
            ctx.events
                .stop_mission_ack
                .trigger(Ack::Conflict("stop already in progress".into()));
        }

        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("mission is stopping".into()));
        }
        if ctx.events.pause_mission.try_consume().is_some() {
            ctx.events
                .pause_mission_ack
                .trigger(Ack::Conflict("mission is stopping".into()));
        }
        if ctx.events.resume_mission.try_consume().is_some() {
            ctx.events
                .resume_mission_ack
                .trigger(Ack::Conflict("mission is stopping".into()));
        }
        if let Some(ModeRequest::Enter) = ctx.events.maintenance_mode.check() {
            if self.continuation != StopContinuation::Maintenance {
                ctx.events.maintenance_mode.clear();
                ctx.events
                    .maintenance_mode_ack
                    .trigger(Ack::Conflict("mission is stopping".into()));
            }
        }

        if let Some(update) = ctx.events.task_status.try_consume() {
            ctx.apply_task_update(update);
        }

        let result = ctx.events.stop_ack.try_consume()?;
        match result {
            Ok(()) => {
                info!(continuation = ?self.continuation, "Stop acknowledged");
                if let Some(mission) = ctx.mission.as_mut() {
                    mission.cancel_unfinished_tasks();
                }
                ctx.set_mission_status(MissionStatus::Cancelled);
                ctx.events.poller_reset.trigger(());
                ctx.drop_mission();
                self.ack_mailbox(ctx).trigger(Ack::Ok);
                match self.continuation {
                    StopContinuation::Idle => {
                        if ctx.battery_below_start_threshold() {
                            go(ReturningHome::new())
                        } else {
                            go(AwaitNextMission::new())
                        }
                    }
                    StopContinuation::Maintenance => go(Maintenance::new()),
                    StopContinuation::Lockdown => go(GoingToLockdown::new()),
                }
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.stop_retry_limit {
                    warn!(error = %e, attempts = self.attempts, "Stop failed, re-issuing");
                    ctx.events.stop_directive.trigger(());
                    None
                } else {
                    error!(error = %e, attempts = self.attempts, "Stop failed terminally");
                    self.ack_mailbox(ctx).trigger(Ack::Rejected(e));
                    match self.continuation {
                        // A plain stop that cannot be honored leaves the
                        // mission where it was.
                        StopContinuation::Idle => {
                            if self.from_paused {
                                go(Paused::new())
                            } else {
                                go(Monitor::reenter())
                            }
                        }
                        // The robot refuses to stop while an operator wants
                        // it in maintenance or lockdown: a human has to sort
                        // that out.
                        StopContinuation::Maintenance | StopContinuation::Lockdown => {
                            go(InterventionNeeded::new())
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorMessage;
    use crate::machine::test_support::test_context;
    use crate::models::{Mission, Task, TaskStatus, TaskType};

    fn stopping_context() -> (MachineContext, crate::telemetry::TelemetryReceiver) {
        let (mut ctx, rx) = test_context();
        ctx.mission = Some(Mission::new(
            "m",
            vec![Task::new(TaskType::ReturnToHome)],
        ));
        (ctx, rx)
    }

    #[test]
    fn enter_issues_stop_directive_once() {
        let (mut ctx, _rx) = stopping_context();
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);
        assert!(ctx.events.stop_directive.has_event());
    }

    #[test]
    fn duplicate_stop_request_gets_conflict_and_no_reissue() {
        let (mut ctx, _rx) = stopping_context();
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);
        ctx.events.stop_directive.try_consume();

        ctx.events.stop_mission.trigger(None);
        assert!(state.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.stop_mission_ack.try_consume(),
            Some(Ack::Conflict(_))
        ));
        // The directive mailbox stayed empty: no second stop was issued.
        assert!(!ctx.events.stop_directive.has_event());
    }

    #[test]
    fn stop_ack_with_high_battery_ends_in_await_next_mission() {
        let (mut ctx, _rx) = stopping_context();
        ctx.events.battery_level.update(90.0);
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);

        ctx.events.stop_ack.trigger(Ok(()));
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "AwaitNextMission");
        assert_eq!(ctx.events.stop_mission_ack.try_consume(), Some(Ack::Ok));
        assert!(ctx.mission.is_none());
    }

    #[test]
    fn stop_ack_with_low_battery_ends_in_returning_home() {
        let (mut ctx, _rx) = stopping_context();
        ctx.events.battery_level.update(10.0);
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);

        ctx.events.stop_ack.trigger(Ok(()));
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "ReturningHome");
    }

    #[test]
    fn stopped_mission_tasks_are_cancelled() {
        let (mut ctx, _rx) = stopping_context();
        ctx.events.battery_level.update(90.0);
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);

        let task_id = ctx.mission.as_ref().unwrap().tasks[0].id;
        ctx.events.task_status.trigger(crate::events::TaskStatusUpdate {
            task_id,
            status: TaskStatus::InProgress,
            error: None,
        });
        ctx.events.stop_ack.trigger(Ok(()));
        state.step(&mut ctx).expect("transition");
        // Mission was dropped after being cancelled; drop leaves no trace
        // here, but the machine must not keep a live mission.
        assert!(ctx.mission.is_none());
    }

    #[test]
    fn exhausted_stop_retries_return_to_monitor() {
        let (mut ctx, _rx) = stopping_context();
        ctx.config.stop_retry_limit = 1;
        let mut state = Stopping::new(StopContinuation::Idle, false);
        state.on_enter(&mut ctx);
        ctx.events.stop_directive.try_consume();

        ctx.events
            .stop_ack
            .trigger(Err(ErrorMessage::action_failure("refused")));
        assert!(state.step(&mut ctx).is_none());
        // Retry re-issued the directive.
        assert!(ctx.events.stop_directive.has_event());

        ctx.events
            .stop_ack
            .trigger(Err(ErrorMessage::action_failure("refused")));
        let next = state.step(&mut ctx).expect("give up");
        assert_eq!(next.name(), "Monitor");
        assert!(matches!(
            ctx.events.stop_mission_ack.try_consume(),
            Some(Ack::Rejected(_))
        ));
        // The mission is still alive.
        assert!(ctx.mission.is_some());
    }

    #[test]
    fn maintenance_stop_continues_into_maintenance() {
        let (mut ctx, _rx) = stopping_context();
        let mut state = Stopping::new(StopContinuation::Maintenance, false);
        assert_eq!(state.name(), "StoppingDueToMaintenance");
        state.on_enter(&mut ctx);

        ctx.events.stop_ack.trigger(Ok(()));
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "Maintenance");
        assert_eq!(
            ctx.events.maintenance_mode_ack.try_consume(),
            Some(Ack::Ok)
        );
    }

    #[test]
    fn exhausted_maintenance_stop_escalates_to_intervention() {
        let (mut ctx, _rx) = stopping_context();
        ctx.config.stop_retry_limit = 0;
        let mut state = Stopping::new(StopContinuation::Maintenance, false);
        state.on_enter(&mut ctx);

        ctx.events
            .stop_ack
            .trigger(Err(ErrorMessage::action_failure("refused")));
        let next = state.step(&mut ctx).expect("give up");
        assert_eq!(next.name(), "InterventionNeeded");
        assert!(matches!(
            ctx.events.maintenance_mode_ack.try_consume(),
            Some(Ack::Rejected(_))
        ));
    }

    #[test]
    fn paused_mission_stop_failure_returns_to_paused() {
        let (mut ctx, _rx) = stopping_context();
        ctx.config.stop_retry_limit = 0;
        let mut state = Stopping::new(StopContinuation::Idle, true);
        assert_eq!(state.name(), "StoppingPausedMission");
        state.on_enter(&mut ctx);

        ctx.events
            .stop_ack
            .trigger(Err(ErrorMessage::action_failure("refused")));
        let next = state.step(&mut ctx).expect("give up");
        assert_eq!(next.name(), "Paused");
    }
}
