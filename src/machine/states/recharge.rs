//! Recharge flow: drive to the charger, then wait for the battery.

use tracing::info;

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::journey::{Journey, JourneyOutcome};
use crate::machine::states::{
    go, GoingToLockdown, Home, InterventionNeeded, Maintenance, NextState, State, StopContinuation,
    StoppingReturnHome,
};
use crate::models::TaskType;

/// Driving to the recharge pose on an internal mission.
pub struct GoingToRecharging {
    journey: Option<Journey>,
}

impl GoingToRecharging {
    pub fn new() -> Self {
        Self { journey: None }
    }
}

impl State for GoingToRecharging {
    fn name(&self) -> &'static str {
        "GoingToRecharging"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        let mut journey = Journey::new(
            "recharge",
            TaskType::DriveToPose {
                pose: ctx.config.recharge_pose,
            },
        );
        journey.dispatch(ctx);
        self.journey = Some(journey);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::low_battery("battery too low, robot is going to recharge"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.events
                .return_home_ack
                .trigger(Ack::Conflict("robot is going to recharge".into()));
        }
        if ctx.events.stop_mission.try_consume().is_some() {
            ctx.events
                .stop_mission_ack
                .trigger(Ack::Conflict("robot is going to recharge".into()));
        }
        if ctx.events.pause_mission.try_consume().is_some() {
            ctx.events
                .pause_mission_ack
                .trigger(Ack::Conflict("robot is going to recharge".into()));
        }
        if ctx.events.resume_mission.try_consume().is_some() {
            ctx.events
                .resume_mission_ack
                .trigger(Ack::Conflict("nothing is paused".into()));
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

        let journey = self.journey.as_mut()?;
        match journey.poll(ctx) {
            JourneyOutcome::Pending => None,
            JourneyOutcome::Succeeded => {
                ctx.drop_mission();
                go(Recharging::new())
            }
            JourneyOutcome::Failed(e) => {
                ctx.set_mission_error(e);
                ctx.drop_mission();
                go(InterventionNeeded::new())
            }
        }
    }
}

/// At the charger; leaves once the battery reaches the recharged level.
pub struct Recharging;

impl Recharging {
    pub fn new() -> Self {
        Self
    }
}

impl State for Recharging {
    fn name(&self) -> &'static str {
        "Recharging"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
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

        if ctx.events.start_mission.try_consume().is_some() {
            let level = ctx.latest_battery().unwrap_or_default();
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::low_battery(format!("recharging, battery at {level:.1}%")),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.events
                .return_home_ack
                .trigger(Ack::Conflict("robot is recharging".into()));
        }
        ctx.reject_mission_commands();

        if let Some(level) = ctx.latest_battery() {
            if level >= ctx.config.battery_recharged_level {
                info!(level, "Battery recharged");
                return go(Home::new());
            }
        }
        None
    }
}
