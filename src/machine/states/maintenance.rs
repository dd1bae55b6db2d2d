//! Maintenance mode: the robot is handed to a technician.

use tracing::info;

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{go, GoingToLockdown, NextState, State, UnknownStatus};
use crate::mode_store::OperatingMode;

/// All mission activity is suspended; persisted so a restart comes back
/// here until an explicit release.
pub struct Maintenance;

impl Maintenance {
    pub fn new() -> Self {
        Self
    }
}

impl State for Maintenance {
    fn name(&self) -> &'static str {
        "Maintenance"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.persist_mode(OperatingMode::Maintenance);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Release => {
                    info!("Maintenance mode released");
                    ctx.persist_mode(OperatingMode::Normal);
                    ctx.events.maintenance_mode_ack.trigger(Ack::Ok);
                    return go(UnknownStatus::new());
                }
                ModeRequest::Enter => ctx
                    .events
                    .maintenance_mode_ack
                    .trigger(Ack::Conflict("already in maintenance mode".into())),
            }
        }

        // A lockdown outranks maintenance.
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

        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::action_failure("robot is in maintenance mode"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::action_failure("robot is in maintenance mode"),
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
    fn maintenance_is_persisted_and_released() {
        let (mut ctx, _rx) = test_context();
        let mode_file = ctx.config.mode_file.clone();
        let mut state = Maintenance::new();
        state.on_enter(&mut ctx);
        let store = ModeStore::new(mode_file);
        assert_eq!(store.read(), OperatingMode::Maintenance);

        ctx.events.maintenance_mode.trigger(ModeRequest::Release);
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "UnknownStatus");
        assert_eq!(
            ctx.events.maintenance_mode_ack.try_consume(),
            Some(Ack::Ok)
        );
        assert_eq!(store.read(), OperatingMode::Normal);
    }

    #[test]
    fn start_during_maintenance_is_rejected() {
        let (mut ctx, _rx) = test_context();
        ctx.events
            .start_mission
            .trigger(crate::events::StartMissionRequest {
                mission: crate::models::Mission::new("m", vec![]),
                initial_pose: None,
            });
        let mut state = Maintenance::new();
        assert!(state.step(&mut ctx).is_none());
        assert!(matches!(
            ctx.events.start_mission_ack.try_consume(),
            Some(Ack::Rejected(_))
        ));
    }

    #[test]
    fn lockdown_wins_over_maintenance() {
        let (mut ctx, _rx) = test_context();
        ctx.events.lockdown.trigger(ModeRequest::Enter);
        let mut state = Maintenance::new();
        let next = state.step(&mut ctx).expect("transition");
        assert_eq!(next.name(), "GoingToLockdown");
        assert_eq!(ctx.events.lockdown_ack.try_consume(), Some(Ack::Ok));
    }
}
