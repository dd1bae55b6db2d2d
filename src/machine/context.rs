//! Shared context handed to every state on every tick.
//!
//! Owns the active mission (states mutate it only through the helpers here,
//! which keep the task-status monotonicity invariant and the telemetry
//! boundary in sync) plus the config, mailboxes, and publishers a state
//! needs to act.

use std::sync::Arc;

use tracing::{error, warn};

use crate::config::Config;
use crate::error::ErrorMessage;
use crate::events::{Ack, Events, MissionHandoff, TaskStatusUpdate};
use crate::mailbox::Mailbox;
use crate::mode_store::{ModeStore, OperatingMode};
use crate::models::{Mission, MissionStatus, Pose, TaskStatus};
use crate::telemetry::TelemetryPublisher;

pub struct MachineContext {
    pub config: Config,
    pub events: Arc<Events>,
    pub telemetry: TelemetryPublisher,
    pub mode_store: ModeStore,
    /// The active mission (user mission or internal journey). Owned by the
    /// state machine task; deep copies cross every thread boundary.
    pub mission: Option<Mission>,
    /// Last battery reading seen, refreshed from the battery mailbox.
    battery: Option<f64>,
}

impl MachineContext {
    pub fn new(
        config: Config,
        events: Arc<Events>,
        telemetry: TelemetryPublisher,
        mode_store: ModeStore,
    ) -> Self {
        Self {
            config,
            events,
            telemetry,
            mode_store,
            mission: None,
            battery: None,
        }
    }

    /// Latest battery level, refreshed from the continuously-updated
    /// mailbox (peeked, not consumed).
    pub fn latest_battery(&mut self) -> Option<f64> {
        if let Some(level) = self.events.battery_level.check() {
            self.battery = Some(level);
        }
        self.battery
    }

    /// Whether a mission may start. Inclusive boundary: a level exactly at
    /// the threshold is sufficient. An unknown level does not block a start.
    pub fn battery_sufficient_to_start(&mut self) -> bool {
        match self.latest_battery() {
            Some(level) => level >= self.config.battery_start_threshold,
            None => {
                warn!("No battery reading yet, allowing mission start");
                true
            }
        }
    }

    /// Whether the battery is known to be below the mission-start threshold.
    pub fn battery_below_start_threshold(&mut self) -> bool {
        matches!(self.latest_battery(), Some(level) if level < self.config.battery_start_threshold)
    }

    /// Set the active mission's status and publish the change.
    pub fn set_mission_status(&mut self, status: MissionStatus) {
        if let Some(mission) = self.mission.as_mut() {
            mission.status = status;
            self.telemetry.publish_mission(mission);
        }
    }

    /// Record a mission-level error without changing the status.
    pub fn set_mission_error(&mut self, error: ErrorMessage) {
        if let Some(mission) = self.mission.as_mut() {
            mission.error = Some(error);
        }
    }

    /// Apply a task status reported by the robot service.
    ///
    /// Keeps the monotonicity invariant (a finished task is never written
    /// again), publishes task telemetry, and hands completed inspections to
    /// the upload queue. Returns whether the update was applied.
    pub fn apply_task_update(&mut self, update: TaskStatusUpdate) -> bool {
        let Some(mission) = self.mission.as_mut() else {
            return false;
        };
        let mission_id = mission.id;
        let Some(task) = mission.task_mut(update.task_id) else {
            warn!(task_id = %update.task_id, "Task status for unknown task");
            return false;
        };
        if !task.set_status(update.status, update.error) {
            return false;
        }
        self.telemetry.publish_task(mission_id, task);
        if task.status == TaskStatus::Successful
            || task.status == TaskStatus::PartiallySuccessful
        {
            self.telemetry.upload_inspection(mission_id, task);
        }
        true
    }

    /// Mark every non-finished task Successful (used when the robot reports
    /// mission success but coalesced task updates were lost), publishing and
    /// uploading each.
    pub fn complete_unfinished_tasks(&mut self) {
        let Some(mission) = self.mission.as_mut() else {
            return;
        };
        let mission_id = mission.id;
        for task in &mut mission.tasks {
            if task.set_status(TaskStatus::Successful, None) {
                self.telemetry.publish_task(mission_id, task);
                self.telemetry.upload_inspection(mission_id, task);
            }
        }
    }

    /// Mark every non-finished task Failed with the given error.
    pub fn fail_unfinished_tasks(&mut self, error: ErrorMessage) {
        let Some(mission) = self.mission.as_mut() else {
            return;
        };
        let mission_id = mission.id;
        for task in &mut mission.tasks {
            if task.set_status(TaskStatus::Failed, Some(error.clone())) {
                self.telemetry.publish_task(mission_id, task);
            }
        }
    }

    /// Change every non-finished task's status (pausing, resuming).
    pub fn set_unfinished_tasks_status(&mut self, status: TaskStatus) {
        let Some(mission) = self.mission.as_mut() else {
            return;
        };
        let mission_id = mission.id;
        for task in &mut mission.tasks {
            if task.set_status(status, None) {
                self.telemetry.publish_task(mission_id, task);
            }
        }
    }

    /// Hand a deep copy of the active mission to the robot service.
    pub fn handoff_active_mission(&self, initial_pose: Option<Pose>) {
        if let Some(mission) = self.mission.as_ref() {
            self.events.mission_handoff.trigger(MissionHandoff {
                mission: mission.clone(),
                initial_pose,
            });
        }
    }

    /// Finish with the active mission and return to mission-less operation.
    pub fn drop_mission(&mut self) {
        self.mission = None;
    }

    /// Persist the operating mode; a write failure is logged, never fatal.
    pub fn persist_mode(&self, mode: OperatingMode) {
        if let Err(e) = self.mode_store.write(mode) {
            error!(?mode, error = %e, "Could not persist operating mode");
        }
    }

    /// Answer a command with a rejection.
    pub fn reject(&self, ack: &Mailbox<Ack>, error: ErrorMessage) {
        ack.trigger(Ack::Rejected(error));
    }

    /// Consume and reject any pending stop/pause/resume request. Used by
    /// states in which no mission is running.
    pub fn reject_mission_commands(&self) {
        if self.events.stop_mission.try_consume().is_some() {
            self.reject(
                &self.events.stop_mission_ack,
                ErrorMessage::no_mission_running("no mission to stop"),
            );
        }
        if self.events.pause_mission.try_consume().is_some() {
            self.reject(
                &self.events.pause_mission_ack,
                ErrorMessage::no_mission_running("no mission to pause"),
            );
        }
        if self.events.resume_mission.try_consume().is_some() {
            self.reject(
                &self.events.resume_mission_ack,
                ErrorMessage::no_mission_running("no mission to resume"),
            );
        }
    }
}
