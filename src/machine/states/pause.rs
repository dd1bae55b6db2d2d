//! Pausing, Paused and Resuming: the mid-mission pause flow.

use tracing::{error, info, warn};

use crate::events::{Ack, ModeRequest};
use crate::machine::context::MachineContext;
use crate::machine::states::{go, Monitor, NextState, State, StopContinuation, Stopping};
use crate::models::{MissionStatus, TaskStatus};

/// A pause command is in flight.
pub struct Pausing {
    attempts: u32,
}

impl Pausing {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }
}

impl State for Pausing {
    fn name(&self) -> &'static str {
        "Pausing"
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
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("a mission is running".into()));
        }
        if ctx.events.resume_mission.try_consume().is_some() {
            ctx.events
                .resume_mission_ack
                .trigger(Ack::Conflict("mission is pausing".into()));
        }

        if let Some(update) = ctx.events.task_status.try_consume() {
            ctx.apply_task_update(update);
        }

        let result = ctx.events.pause_ack.try_consume()?;
        match result {
            Ok(()) => {
                info!("Mission paused");
                ctx.set_unfinished_tasks_status(TaskStatus::Paused);
                ctx.set_mission_status(MissionStatus::Paused);
                ctx.events.pause_mission_ack.trigger(Ack::Ok);
                go(Paused::new())
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.pause_retry_limit {
                    warn!(error = %e, attempts = self.attempts, "Pause failed, re-issuing");
                    ctx.events.pause_directive.trigger(());
                    None
                } else {
                    error!(error = %e, attempts = self.attempts, "Pause failed terminally");
                    ctx.events.pause_mission_ack.trigger(Ack::Rejected(e));
                    go(Monitor::reenter())
                }
            }
        }
    }
}

/// The mission is paused on the robot; waiting for a resume, stop, or mode
/// change.
pub struct Paused;

impl Paused {
    pub fn new() -> Self {
        Self
    }
}

impl State for Paused {
    fn name(&self) -> &'static str {
        "Paused"
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.resume_mission.try_consume().is_some() {
            return go(Resuming::new());
        }

        if let Some(requested_id) = ctx.events.stop_mission.try_consume() {
            let active_id = ctx.mission.as_ref().map(|m| m.id);
            if requested_id.is_some() && requested_id != active_id {
                ctx.reject(
                    &ctx.events.stop_mission_ack,
                    crate::error::ErrorMessage::no_mission_running(
                        "mission id does not match the active mission",
                    ),
                );
            } else {
                return go(Stopping::new(StopContinuation::Idle, true));
            }
        }

        if ctx.events.pause_mission.try_consume().is_some() {
            ctx.events
                .pause_mission_ack
                .trigger(Ack::Conflict("mission is already paused".into()));
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("a paused mission is pending".into()));
        }
        if ctx.events.return_home.try_consume().is_some() {
            ctx.events
                .return_home_ack
                .trigger(Ack::Conflict("a paused mission is pending".into()));
        }

        if let Some(request) = ctx.events.maintenance_mode.try_consume() {
            match request {
                ModeRequest::Enter => {
                    return go(Stopping::new(StopContinuation::Maintenance, true))
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
                    return go(Stopping::new(StopContinuation::Lockdown, true))
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

/// A resume command is in flight; success hands back to Monitor.
pub struct Resuming {
    attempts: u32,
}

impl Resuming {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }
}

impl State for Resuming {
    fn name(&self) -> &'static str {
        "Resuming"
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) {
        ctx.events.resume_ack.clear();
        ctx.events.resume_directive.trigger(());
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Option<NextState> {
        if ctx.events.resume_mission.try_consume().is_some() {
            ctx.events
                .resume_mission_ack
                .trigger(Ack::Conflict("resume already in progress".into()));
        }
        if ctx.events.start_mission.try_consume().is_some() {
            ctx.events
                .start_mission_ack
                .trigger(Ack::Conflict("a mission is running".into()));
        }

        let result = ctx.events.resume_ack.try_consume()?;
        match result {
            Ok(()) => {
                info!("Mission resumed");
                ctx.events.resume_mission_ack.trigger(Ack::Ok);
                // Monitor::on_enter flips the mission back to InProgress;
                // task statuses refresh from the mission poller.
                go(Monitor::reenter())
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts <= ctx.config.pause_retry_limit {
                    warn!(error = %e, attempts = self.attempts, "Resume failed, re-issuing");
                    ctx.events.resume_directive.trigger(());
                    None
                } else {
                    error!(error = %e, attempts = self.attempts, "Resume failed terminally");
                    ctx.events.resume_mission_ack.trigger(Ack::Rejected(e));
                    go(Paused::new())
                }
            }
        }
    }
}
