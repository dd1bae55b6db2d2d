//! The return-home journey and its pause/stop sub-states.

use tracing::{error, info, warn};

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::journey::{Journey, JourneyOutcome};
use crate::machine::states::{
    go, GoingToLockdown, GoingToRecharging, Home, InterventionNeeded, Maintenance, NextState,
    RobotStandingStill, State, StopContinuation,
};
use crate::models::{MissionStatus, TaskStatus, TaskType};

/// The robot drives home on an internal single-task mission.
///
/// Entered on idle timeout, on a `return-home` command, or whenever the
/// battery is too low to stay out. Success ends at `Home`, or at
/// `GoingToRecharging` when the battery is below the start threshold.
pub struct ReturningHome {
    journey: Journey,
    dispatched: bool,
}

impl ReturningHome {
    pub fn new() -> Self {
        Self {
            journey: Journey::new("return-home", TaskType::ReturnToHome),
            dispatched: false,
        }
    }

    /// Re-entry after a pause: the journey mission is already on the robot.
    pub fn reenter() -> Self {
        Self {
            journey: Journey::new("return-home", TaskType::ReturnToHome),
            dispatched: true,
        }
    }
}

impl State for ReturningHome {
    fn name(&self) -> &'static str {
        "ReturningHome"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        if !self.dispatched {
            self.journey.dispatch(ctx);
            self.dispatched = true;
        }
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("robot is returning home".into()));
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.events
                .return_home_ack
                .trigger(Ack::Conflict("already returning home".into()));
        }
        if ctx.events.resume_mission.try_consume().is_some() {
            ctx.events
                .resume_mission_ack
                .trigger(Ack::Conflict("nothing is paused".into()));
        }

        if ctx.events.stop_mission.try_consume().is_some() {
            return go(StoppingReturnHome::new(StopContinuation::Idle));
        }
        if ctx.events.pause_mission.try_consume().is_some() {
            return go(PausingReturnHome::new());
        }
        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(StoppingReturnHome::new(StopContinuation::Maintenance))
                }
                ModeRequest::Release => ctx
                    .events
                    .maintenance_mode_ack
                    .trigger(Ack::Conflict("not in maintenance mode".into())),
            }
        }
        if let Some(request) = ctx.events.lockdown.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(StoppingReturnHome::new(StopContinuation::Lockdown))
                }
                ModeRequest::Release => ctx
                    .events
                    .lockdown_ack
                    .trigger(Ack::Conflict("not in lockdown".into())),
            }
        }

        match self.journey.poll(ctx) {
            JourneyOutcome::Pending => None,
            JourneyOutcome::Succeeded => {
                info!("Robot is home");
                ctx.drop_mission();
                if ctx.battery_below_start_threshold() {
                    go(GoingToRecharging::new())
                } else {
                    go(Home::new())
                }
            }
            JourneyOutcome::Failed(e) => {
                ctx.set_mission_error(e);
                ctx.drop_mission();
                go(InterventionNeeded::new())
            }
        }
    }
}

/// A pause command for the return-home journey is in flight.
pub struct PausingReturnHome {
    attempts: u32,
}

impl PausingReturnHome {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }
}

impl State for PausingReturnHome {
    fn name(&self) -> &'static str {
        "PausingReturnHome"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.events.pause_ack.clear();
        ctx.events.pause_directive.trigger(());
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.pause_mission.try_consume().is_some() {
            ctx.events
                .pause_mission_ack
                .trigger(Ack::Conflict("pause already in progress".into()));
        }

        let result = ctx.events.pause_ack.try_consume()?;
        match result {
            Ok(()) => {
                ctx.set_unfinished_tasks_status(TaskStatus::Paused);
                ctx.set_mission_status(MissionStatus::Paused);
                ctx.events.pause_mission_ack.trigger(Ack::Ok);
                go(ReturnHomePaused::new())
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.pause_retry_limit {
                    warn!(error = %e, attempts = self.attempts,
                        "Return-home pause failed, re-issuing");
                    ctx.events.pause_directive.trigger(());
                    None
                } else {
                    error!(error = %e, "Return-home pause failed terminally");
                    ctx.events.pause_mission_ack.trigger(Ack::Rejected(e));
                    go(ReturningHome::reenter())
                }
            }
        }
    }
}

/// The return-home journey is paused on the robot.
pub struct ReturnHomePaused;

impl ReturnHomePaused {
    pub fn new() -> Self {
        Self
    }
}

impl State for ReturnHomePaused {
    fn name(&self) -> &'static str {
        "ReturnHomePaused"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.resume_mission.try_consume().is_some() {
            return go(ResumingReturnHome::new());
        }
        if ctx.events.stop_mission.try_consume().is_some() {
            return go(StoppingReturnHome::new(StopContinuation::Idle));
        }
        if ctx.events.pause_mission.try_consume().is_some() {
            ctx.events
                .pause_mission_ack
                .trigger(Ack::Conflict("already paused".into()));
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("a paused return-home is pending".into()));
        }
        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(StoppingReturnHome::new(StopContinuation::Maintenance))
                }
                ModeRequest::Release => ctx
                    .events
                    .maintenance_mode_ack
                    .trigger(Ack::Conflict("not in maintenance mode".into())),
            }
        }
        if let Some(request) = ctx.events.lockdown.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(StoppingReturnHome::new(StopContinuation::Lockdown))
                }
                ModeRequest::Release => ctx
                    .events
                    .lockdown_ack
                    .trigger(Ack::Conflict("not in lockdown".into())),
            }
        }
        None
    }
}

/// A resume command for the paused return-home journey is in flight.
pub struct ResumingReturnHome {
    attempts: u32,
}

impl ResumingReturnHome {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }
}

impl State for ResumingReturnHome {
    fn name(&self) -> &'static str {
        "ResumingReturnHome"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.events.resume_ack.clear();
        ctx.events.resume_directive.trigger(());
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        let result = ctx.events.resume_ack.try_consume()?;
        match result {
            Ok(()) => {
                ctx.set_mission_status(MissionStatus::InProgress);
                ctx.events.resume_mission_ack.trigger(Ack::Ok);
                go(ReturningHome::reenter())
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.pause_retry_limit {
                    warn!(error = %e, attempts = self.attempts,
                        "Return-home resume failed, re-issuing");
                    ctx.events.resume_directive.trigger(());
                    None
                } else {
                    error!(error = %e, "Return-home resume failed terminally");
                    ctx.events.resume_mission_ack.trigger(Ack::Rejected(e));
                    go(ReturnHomePaused::new())
                }
            }
        }
    }
}

/// Stops the active internal journey (return home or recharge/lockdown
/// drive) so something else can happen. The continuation picks where the
/// machine goes once the stop is acknowledged.
pub struct StoppingReturnHome {
    continuation: StopContinuation,
    attempts: u32,
}

impl StoppingReturnHome {
    pub fn new(continuation: StopContinuation) -> Self {
        Self {
            continuation,
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

impl State for StoppingReturnHome {
    fn name(&self) -> &'static str {
        "StoppingReturnHome"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.events.stop_ack.clear();
        ctx.events.stop_directive.trigger(());
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.stop_mission.try_consume().is_some() {
            ctx.events
                .stop_mission_ack
                .trigger(Ack::Conflict("stop already in progress".into()));
        }

        let result = ctx.events.stop_ack.try_consume()?;
        match result {
            Ok(()) => {
                if let Some(mission) = ctx.mission.as_mut() {
                    mission.cancel_unfinished_tasks();
                }
                ctx.set_mission_status(MissionStatus::Cancelled);
                ctx.events.poller_reset.trigger(());
                ctx.drop_mission();
                self.ack_mailbox(ctx).trigger(Ack::Ok);
                match self.continuation {
                    StopContinuation::Idle => go(RobotStandingStill::new()),
                    StopContinuation::Maintenance => go(Maintenance::new()),
                    StopContinuation::Lockdown => go(GoingToLockdown::new()),
                }
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.stop_retry_limit {
                    warn!(error = %e, attempts = self.attempts,
                        "Journey stop failed, re-issuing");
                    ctx.events.stop_directive.trigger(());
                    None
                } else {
                    error!(error = %e, "Journey stop failed terminally");
                    self.ack_mailbox(ctx)
                        .trigger(Ack::Rejected(e.clone()));
                    ctx.set_mission_error(ErrorMessage::action_failure(
                        "journey could not be stopped",
                    ));
                    ctx.drop_mission();
                    go(InterventionNeeded::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MissionStatusUpdate, TaskStatusUpdate};
    use crate::machine::test_support::test_context;
    use crate::models::TaskStatus;

    #[test]
    fn enter_dispatches_a_return_home_mission() {
        let (mut ctx, _rx) = test_context();
        let mut state = ReturningHome::new();
        state.on_enter(&mut ctx);

        let mission = ctx.mission.as_ref().expect("journey mission");
        assert_eq!(mission.tasks.len(), 1);
        assert!(matches!(mission.tasks[0].kind, TaskType::ReturnToHome));
        let handoff = ctx.events.mission_handoff.try_consume().expect("handoff");
        assert_eq!(handoff.mission.id, mission.id);
    }

    #[test]
    fn reenter_does_not_redispatch() {
        let (mut ctx, _rx) = test_context();
        let mut state = ReturningHome::reenter();
        state.on_enter(&mut ctx);
        assert!(!ctx.events.mission_handoff.has_event());
    }

    #[test]
    fn arriving_home_with_good_battery_ends_at_home() {
        let (mut ctx, _rx) = test_context();
        ctx.events.battery_level.update(85.0);
        let mut state = ReturningHome::new();
        state.on_enter(&mut ctx);
        ctx.events.mission_handoff.clear();

        let task_id = ctx.mission.as_ref().unwrap().tasks[0].id;
        ctx.events.task_status.trigger(TaskStatusUpdate {
            task_id,
            status: TaskStatus::Successful,
            error: None,
        });
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "Home");
        assert!(ctx.mission.is_none());
    }

    #[test]
    fn arriving_home_with_low_battery_goes_to_recharging() {
        let (mut ctx, _rx) = test_context();
        ctx.events.battery_level.update(12.0);
        let mut state = ReturningHome::new();
        state.on_enter(&mut ctx);

        let mission_id = ctx.mission.as_ref().unwrap().id;
        ctx.events.mission_status.trigger(MissionStatusUpdate {
            mission_id,
            status: MissionStatus::Successful,
            error: None,
        });
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "GoingToRecharging");
    }

    #[test]
    fn exhausted_journey_retries_escalate_to_intervention() {
        let (mut ctx, _rx) = test_context();
        ctx.config.journey_retry_limit = 1;
        let mut state = ReturningHome::new();
        state.on_enter(&mut ctx);
        ctx.events.mission_handoff.clear();

        ctx.events
            .initiate_ack
            .trigger(Err(ErrorMessage::infeasible("no path home")));
        assert!(state.step(&mut ctx).is_none());
        // The retry dispatched a fresh journey mission.
        assert!(ctx.events.mission_handoff.has_event());

        ctx.events
            .initiate_ack
            .trigger(Err(ErrorMessage::infeasible("no path home")));
        let next = state.step(&mut ctx).expect("escalation");
        assert_eq!(next.name(), "InterventionNeeded");
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let (mut ctx, _rx) = test_context();
        let mut returning = ReturningHome::new();
        returning.on_enter(&mut ctx);

        ctx.events.pause_mission.trigger(());
        let next = returning.step(&mut ctx).expect("pausing");
        assert_eq!(next.name(), "PausingReturnHome");

        let mut pausing = PausingReturnHome::new();
        pausing.on_enter(&mut ctx);
        ctx.events.pause_ack.trigger(Ok(()));
        let next = pausing.step(&mut ctx).expect("paused");
        assert_eq!(next.name(), "ReturnHomePaused");
        assert_eq!(ctx.events.pause_mission_ack.try_consume(), Some(Ack::Ok));

        let mut paused = ReturnHomePaused::new();
        ctx.events.resume_mission.trigger(());
        let next = paused.step(&mut ctx).expect("resuming");
        assert_eq!(next.name(), "ResumingReturnHome");

        let mut resuming = ResumingReturnHome::new();
        resuming.on_enter(&mut ctx);
        ctx.events.resume_ack.trigger(Ok(()));
        let next = resuming.step(&mut ctx).expect("back to journey");
        assert_eq!(next.name(), "ReturningHome");
        assert_eq!(ctx.events.resume_mission_ack.try_consume(), Some(Ack::Ok));
    }

    #[test]
    fn release_while_return_home_paused_gets_conflict() {
        let (mut ctx, _rx) = test_context();
        let mut paused = ReturnHomePaused::new();

        ctx.events.maintenance_mode.trigger(ModeRequest::Release);
        assert!(paused.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.maintenance_mode_ack.try_consume(),
            Some(Ack::Conflict(_))
        ));

        ctx.events.lockdown.trigger(ModeRequest::Release);
        assert!(paused.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.lockdown_ack.try_consume(),
            Some(Ack::Conflict(_))
        ));
    }

    #[test]
    fn lockdown_during_return_home_stops_then_locks_down() {
        let (mut ctx, _rx) = test_context();
        let mut returning = ReturningHome::new();
        returning.on_enter(&mut ctx);

        ctx.events.lockdown.trigger(ModeRequest::Enter);
        let next = returning.step(&mut ctx).expect("stopping");
        assert_eq!(next.name(), "StoppingReturnHome");

        let mut stopping = StoppingReturnHome::new(StopContinuation::Lockdown);
        stopping.on_enter(&mut ctx);
        ctx.events.stop_ack.trigger(Ok(()));
        let next = stopping.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "GoingToLockdown");
        assert_eq!(ctx.events.lockdown_ack.try_consume(), Some(Ack::Ok));
    }

    #[test]
    fn journey_stop_for_idle_ends_standing_still() {
        let (mut ctx, _rx) = test_context();
        let mut returning = ReturningHome::new();
        returning.on_enter(&mut ctx);

        let mut stopping = StoppingReturnHome::new(StopContinuation::Idle);
        stopping.on_enter(&mut ctx);
        ctx.events.stop_ack.trigger(Ok(()));
        let next = stopping.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "RobotStandingStill");
        assert_eq!(ctx.events.stop_mission_ack.try_consume(), Some(Ack::Ok));
    }
}
