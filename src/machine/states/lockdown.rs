//! Lockdown flow: drive to the lockdown pose and stay there.

use tracing::{info, warn};

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::journey::{Journey, JourneyOutcome};
use crate::machine::states::{go, InterventionNeeded, NextState, State, UnknownStatus};
use crate::mode_store::OperatingMode;
use crate::models::TaskType;

/// Driving to the lockdown pose on an internal mission.
pub struct GoingToLockdown {
    journey: Option<Journey>,
}

impl GoingToLockdown {
    pub fn new() -> Self {
        Self { journey: None }
    }
}

impl State for GoingToLockdown {
    fn name(&self) -> &'static str {
        "GoingToLockdown"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        let mut journey = Journey::new(
            "lockdown",
            TaskType::DriveToPose {
                pose: ctx.config.lockdown_pose,
            },
        );
        journey.dispatch(ctx);
        self.journey = Some(journey);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(request) = ctx.events.lockdown.try_consume() {
            ctx.events.lockdown_ack.trigger(Ack::Conflict(match request {
                ModeRequest::Enter => "lockdown already in progress".into(),
                ModeRequest::Release => "lockdown still in progress".into(),
            }));
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::action_failure("lockdown in progress"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::action_failure("lockdown in progress"),
            );
        }
        if let Some(ModeRequest::Enter) = ctx.events.maintenance_mode.try_consume() {
            ctx.events
                .maintenance_mode_ack
                .trigger(Ack::Conflict("lockdown in progress".into()));
        }
        ctx.reject_mission_commands();

        let journey = self.journey.as_mut()?;
        match journey.poll(ctx) {
            JourneyOutcome::Pending => None,
            JourneyOutcome::Succeeded => {
                ctx.drop_mission();
                go(Lockdown::new())
            }
            JourneyOutcome::Failed(e) => {
                warn!(error = %e, "Robot could not reach the lockdown pose");
                ctx.set_mission_error(e);
                ctx.drop_mission();
                go(InterventionNeeded::new())
            }
        }
    }
}

/// Parked at the lockdown pose. Persisted, so a restart comes back here;
/// only an explicit release leaves.
pub struct Lockdown;

impl Lockdown {
    pub fn new() -> Self {
        Self
    }
}

impl State for Lockdown {
    fn name(&self) -> &'static str {
        "Lockdown"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.persist_mode(OperatingMode::Lockdown);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(request) = ctx.events.lockdown.try_consume() {
            match request {
                ModeRequest::Release => {
                    info!("Lockdown released");
                    ctx.persist_mode(OperatingMode::Normal);
                    ctx.events.lockdown_ack.trigger(Ack::Ok);
                    return go(UnknownStatus::new());
                }
                ModeRequest::Enter => ctx
                    .events
                    .lockdown_ack
                    .trigger(Ack::Conflict("already in lockdown".into())),
            }
        }
        if ctx.events.maintenance_mode.try_consume().is_some() {
            ctx.events
                .maintenance_mode_ack
                .trigger(Ack::Conflict("robot is in lockdown".into()));
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::action_failure("robot is in lockdown"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::action_failure("robot is in lockdown"),
            );
        }
        ctx.reject_mission_commands();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::test_support::test_context;
    use crate::mode_store::ModeStore;

    #[test]
    fn lockdown_is_persisted_on_enter_and_cleared_on_release() {
        let (mut ctx, _rx) = test_context();
        let mode_file = ctx.config.mode_file.clone();
        let mut state = Lockdown::new();
        state.on_enter(&mut ctx);
        let store = ModeStore::new(mode_file);
        assert_eq!(store.read(), OperatingMode::Lockdown);

        ctx.events.lockdown.trigger(ModeRequest::Release);
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "UnknownStatus");
        assert_eq!(ctx.events.lockdown_ack.try_consume(), Some(Ack::Ok));
        assert_eq!(store.read(), OperatingMode::Normal);
    }

    #[test]
    fn start_during_lockdown_is_rejected() {
        let (mut ctx, _rx) = test_context();
        ctx.events
            .start_mission
            .trigger(crate::events::StartMissionRequest {
                mission: crate::models::Mission::new("m", vec![]),
                initial_pose: None,
            });
        let mut state = Lockdown::new();
        assert!(state.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.start_mission_ack.try_consume(),
            Some(Ack::Rejected(_))
        ));
    }

    #[test]
    fn duplicate_lockdown_request_gets_conflict() {
        let (mut ctx, _rx) = test_context();
        let mut state = GoingToLockdown::new();
        state.on_enter(&mut ctx);
        ctx.events.lockdown.trigger(ModeRequest::Enter);
        assert!(state.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.lockdown_ack.try_consume(),
            Some(Ack::Conflict(_))
        ));
    }
}
