//! InterventionNeeded: something went wrong that the supervisor cannot fix.

use tracing::info;

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{
    go, GoingToLockdown, Home, Maintenance, NextState, State, UnknownStatus,
};
use crate::robot::RobotStatus;

/// Waiting for an operator. Mission commands are rejected until the
/// intervention is released or the robot reports itself back at home.
pub struct InterventionNeeded;

impl InterventionNeeded {
    pub fn new() -> Self {
        Self
    }
}

impl State for InterventionNeeded {
    fn name(&self) -> &'static str {
        "InterventionNeeded"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.release_intervention.try_consume().is_some() {
            info!("Intervention released by operator");
            ctx.events.release_intervention_ack.trigger(Ack::Ok);
            return go(UnknownStatus::new());
        }

        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Enter => {
                    ctx.events.maintenance_mode_ack.trigger(Ack::Ok);
                    return go(Maintenance::new());
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
                    ctx.events.lockdown_ack.trigger(Ack::Ok);
                    return go(GoingToLockdown::new());
                }
                ModeRequest::Release => ctx
                    .events
                    .lockdown_ack
                    .trigger(Ack::Conflict("not in lockdown".into())),
            }
        }

        // An operator may drive the robot home by hand. Other statuses are
        // left in the mailbox for whatever state follows the release.
        if ctx.events.robot_status.check() == Some(RobotStatus::Home) {
            ctx.events.robot_status.clear();
            info!("Robot back at home, clearing intervention");
            return go(Home::new());
        }

        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::action_failure("operator intervention needed"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::action_failure("operator intervention needed"),
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

    #[test]
    fn release_returns_to_unknown_status() {
        let (mut ctx, _rx) = test_context();
        ctx.events.release_intervention.trigger(());
        let mut state = InterventionNeeded::new();
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "UnknownStatus");
        assert_eq!(
            ctx.events.release_intervention_ack.try_consume(),
            Some(Ack::Ok)
        );
    }

    #[test]
    fn robot_reported_home_clears_intervention() {
        let (mut ctx, _rx) = test_context();
        ctx.events.robot_status.trigger(RobotStatus::Home);
        let mut state = InterventionNeeded::new();
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "Home");
    }

    #[test]
    fn start_is_rejected_while_intervention_pending() {
        let (mut ctx, _rx) = test_context();
        ctx.events
            .start_mission
            .trigger(crate::events::StartMissionRequest {
                mission: crate::models::Mission::new("m", vec![]),
                initial_pose: None,
            });
        let mut state = InterventionNeeded::new();
        assert!(state.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.start_mission_ack.try_consume(),
            Some(Ack::Rejected(_))
        ));
    }
}
