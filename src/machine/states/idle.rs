//! Idle/availability states: no mission is running.
//!
//! `Home`, `RobotStandingStill` and `AwaitNextMission` share one handler
//! chain; they differ only in whether the robot is at home and whether an
//! idle timer sends it back there. `UnknownStatus`, `Offline` and
//! `BlockedProtectiveStop` have their own, more restrictive chains.

use tokio::time::Instant;
use tracing::warn;

use crate::error::ErrorMessage;
use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{
    go, GoingToLockdown, GoingToRecharging, Maintenance, Monitor, NextState, ReturningHome, State,
};
use crate::models::MissionStatus;
use crate::robot::RobotStatus;

/// Maintenance/lockdown/release requests, shared by every idle-family state.
fn handle_mode_requests(ctx: &mut MachineContext) -> Option<NextState> {
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
    if ctx.events.release_intervention.try_consume().is_some() {
        ctx.events
            .release_intervention_ack
            .trigger(Ack::Conflict("no intervention pending".into()));
    }
    None
}

/// Start-mission request, gated on the battery level.
///
/// Inclusive boundary: a level exactly at the threshold is sufficient.
/// Below it, the request is rejected (never silently dropped) and going
/// home to recharge preempts the start.
fn handle_start_request(ctx: &mut MachineContext, at_home: bool) -> Option<NextState> {
    let request = ctx.events.start_mission.try_consume()?;
    if !ctx.battery_sufficient_to_start() {
        let level = ctx.latest_battery().unwrap_or_default();
        ctx.reject(
            &ctx.events.start_mission_ack,
            ErrorMessage::low_battery(format!(
                "battery at {level:.1}%, below start threshold of {:.1}%",
                ctx.config.battery_start_threshold
            )),
        );
        return if at_home {
            go(GoingToRecharging::new())
        } else {
            go(ReturningHome::new())
        };
    }
    let mut mission = request.mission;
    mission.status = MissionStatus::NotStarted;
    ctx.mission = Some(mission);
    ctx.events.start_mission_ack.trigger(Ack::Ok);
    go(Monitor::new(request.initial_pose))
}

fn handle_return_home_request(ctx: &mut MachineContext, at_home: bool) -> Option<NextState> {
    ctx.events.return_home.try_consume()?;
    if at_home {
        ctx.events
            .return_home_ack
            .trigger(Ack::Conflict("already home".into()));
        return None;
    }
    ctx.events.return_home_ack.trigger(Ack::Ok);
    go(ReturningHome::new())
}

fn handle_status_change(ctx: &mut MachineContext, at_home: bool) -> Option<NextState> {
    let status = ctx.events.robot_status.try_consume()?;
    match status {
        RobotStatus::Offline => go(Offline::new()),
        RobotStatus::BlockedProtectiveStop => go(BlockedProtectiveStop::new()),
        RobotStatus::Home if !at_home => go(Home::new()),
        RobotStatus::Available if at_home => go(RobotStandingStill::new()),
        _ => None,
    }
}

fn handle_low_battery(ctx: &mut MachineContext, at_home: bool) -> Option<NextState> {
    if !ctx.battery_below_start_threshold() {
        return None;
    }
    if at_home {
        go(GoingToRecharging::new())
    } else {
        go(ReturningHome::new())
    }
}

/// The full idle handler chain, in priority order.
fn idle_step(ctx: &mut MachineContext, at_home: bool) -> Option<NextState> {
    if let Some(next) = handle_mode_requests(ctx) {
        return Some(next);
    }
    if let Some(next) = handle_start_request(ctx, at_home) {
        return Some(next);
    }
    if let Some(next) = handle_return_home_request(ctx, at_home) {
        return Some(next);
    }
    if let Some(next) = handle_status_change(ctx, at_home) {
        return Some(next);
    }
    if let Some(next) = handle_low_battery(ctx, at_home) {
        return Some(next);
    }
    ctx.reject_mission_commands();
    None
}

/// Robot reported at home and ready.
pub struct Home;

impl Home {
    pub fn new() -> Self {
        Self
    }
}

impl State for Home {
    fn name(&self) -> &'static str {
        "Home"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        idle_step(ctx, true)
    }
}

/// Robot ready, away from home; goes home after the idle timeout.
pub struct RobotStandingStill {
    idle_deadline: Option<Instant>,
}

impl RobotStandingStill {
    pub fn new() -> Self {
        Self {
            idle_deadline: None,
        }
    }
}

impl State for RobotStandingStill {
    fn name(&self) -> &'static str {
        "RobotStandingStill"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        self.idle_deadline = Some(Instant::now() + ctx.config.idle_timeout);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(next) = idle_step(ctx, false) {
            return Some(next);
        }
        if matches!(self.idle_deadline, Some(deadline) if Instant::now() >= deadline) {
            return go(ReturningHome::new());
        }
        None
    }
}

/// A mission just finished; waiting for the next one.
pub struct AwaitNextMission {
    idle_deadline: Option<Instant>,
}

impl AwaitNextMission {
    pub fn new() -> Self {
        Self {
            idle_deadline: None,
        }
    }
}

impl State for AwaitNextMission {
    fn name(&self) -> &'static str {
        "AwaitNextMission"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        self.idle_deadline = Some(Instant::now() + ctx.config.idle_timeout);
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(next) = idle_step(ctx, false) {
            return Some(next);
        }
        if matches!(self.idle_deadline, Some(deadline) if Instant::now() >= deadline) {
            return go(ReturningHome::new());
        }
        None
    }
}

/// Initial state: nothing is known about the robot yet.
pub struct UnknownStatus;

impl UnknownStatus {
    pub fn new() -> Self {
        Self
    }
}

impl State for UnknownStatus {
    fn name(&self) -> &'static str {
        "UnknownStatus"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(next) = handle_mode_requests(ctx) {
            return Some(next);
        }
        if let Some(status) = ctx.events.robot_status.try_consume() {
            return match status {
                RobotStatus::Home => go(Home::new()),
                RobotStatus::Available => go(AwaitNextMission::new()),
                RobotStatus::Offline => go(Offline::new()),
                RobotStatus::BlockedProtectiveStop => go(BlockedProtectiveStop::new()),
                RobotStatus::Busy => {
                    warn!("Robot busy while supervisor has no mission");
                    None
                }
            };
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::unknown("robot status unknown"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::unknown("robot status unknown"),
            );
        }
        ctx.reject_mission_commands();
        None
    }
}

/// Robot unreachable or powered down.
pub struct Offline;

impl Offline {
    pub fn new() -> Self {
        Self
    }
}

impl State for Offline {
    fn name(&self) -> &'static str {
        "Offline"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(next) = handle_mode_requests(ctx) {
            return Some(next);
        }
        if let Some(status) = ctx.events.robot_status.try_consume() {
            if status != RobotStatus::Offline {
                // Repost so UnknownStatus can resolve it; the poller only
                // publishes changes and will not send it again.
                ctx.events.robot_status.trigger(status);
                return go(UnknownStatus::new());
            }
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::communication_failure("robot is offline"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::communication_failure("robot is offline"),
            );
        }
        ctx.reject_mission_commands();
        None
    }
}

/// Robot halted by a protective stop.
pub struct BlockedProtectiveStop;

impl BlockedProtectiveStop {
    pub fn new() -> Self {
        Self
    }
}

impl State for BlockedProtectiveStop {
    fn name(&self) -> &'static str {
        "BlockedProtectiveStop"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if let Some(next) = handle_mode_requests(ctx) {
            return Some(next);
        }
        if let Some(status) = ctx.events.robot_status.try_consume() {
            if status != RobotStatus::BlockedProtectiveStop {
                ctx.events.robot_status.trigger(status);
                return go(UnknownStatus::new());
            }
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.reject(
                &ctx.events.start_mission_ack,
                ErrorMessage::action_failure("robot is in protective stop"),
            );
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.reject(
                &ctx.events.return_home_ack,
                ErrorMessage::action_failure("robot is in protective stop"),
            );
        }
        ctx.reject_mission_commands();
        None
    }
}
