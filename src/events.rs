//! Every mailbox that crosses a thread boundary, in one place.
//!
//! Three groups: command mailbox pairs consumed from the API layer, the
//! directives the state machine hands to the robot communication service,
//! and the status/acknowledgement mailboxes the service publishes back.

use crate::error::ErrorMessage;
use crate::mailbox::Mailbox;
use crate::models::{Mission, MissionId, MissionStatus, Pose, TaskId, TaskStatus};
use crate::robot::RobotStatus;

/// Outcome of an imperative robot command, published on an ack mailbox.
pub type CommandResult = Result<(), ErrorMessage>;

/// Acknowledgement returned to the API layer for a command request.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// The request was accepted and acted on.
    Ok,
    /// The request was rejected; the reason says why.
    Rejected(ErrorMessage),
    /// The request conflicts with what is already happening (e.g. a second
    /// stop while stopping) and was deliberately not acted on.
    Conflict(String),
}

impl Ack {
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }
}

/// Payload of `set-maintenance-mode` and `send-to-lockdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    Enter,
    Release,
}

/// A start-mission request from the API layer.
#[derive(Debug, Clone)]
pub struct StartMissionRequest {
    pub mission: Mission,
    pub initial_pose: Option<Pose>,
}

/// Deep copy of the active mission handed to the robot service.
#[derive(Debug, Clone)]
pub struct MissionHandoff {
    pub mission: Mission,
    pub initial_pose: Option<Pose>,
}

/// Task status reported by the robot communication service.
#[derive(Debug, Clone)]
pub struct TaskStatusUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub error: Option<ErrorMessage>,
}

/// Mission status reported by the robot communication service.
#[derive(Debug, Clone)]
pub struct MissionStatusUpdate {
    pub mission_id: MissionId,
    pub status: MissionStatus,
    pub error: Option<ErrorMessage>,
}

/// All mailboxes of the supervisor. Shared as `Arc<Events>`.
pub struct Events {
    // Commands from the API layer, each paired with its ack mailbox.
    pub start_mission: Mailbox<StartMissionRequest>,
    pub start_mission_ack: Mailbox<Ack>,
    pub stop_mission: Mailbox<Option<MissionId>>,
    pub stop_mission_ack: Mailbox<Ack>,
    pub pause_mission: Mailbox<()>,
    pub pause_mission_ack: Mailbox<Ack>,
    pub resume_mission: Mailbox<()>,
    pub resume_mission_ack: Mailbox<Ack>,
    pub return_home: Mailbox<()>,
    pub return_home_ack: Mailbox<Ack>,
    pub release_intervention: Mailbox<()>,
    pub release_intervention_ack: Mailbox<Ack>,
    pub maintenance_mode: Mailbox<ModeRequest>,
    pub maintenance_mode_ack: Mailbox<Ack>,
    pub lockdown: Mailbox<ModeRequest>,
    pub lockdown_ack: Mailbox<Ack>,

    /// Continuously-updated current state name, for `get-state` polling.
    pub current_state: Mailbox<&'static str>,

    // State machine -> robot communication service.
    pub mission_handoff: Mailbox<MissionHandoff>,
    pub stop_directive: Mailbox<()>,
    pub pause_directive: Mailbox<()>,
    pub resume_directive: Mailbox<()>,
    /// Tells the mission poller to disarm (mission cancelled or finished).
    pub poller_reset: Mailbox<()>,

    // Robot communication service -> state machine.
    pub initiate_ack: Mailbox<CommandResult>,
    pub stop_ack: Mailbox<CommandResult>,
    pub pause_ack: Mailbox<CommandResult>,
    pub resume_ack: Mailbox<CommandResult>,
    pub robot_status: Mailbox<RobotStatus>,
    pub battery_level: Mailbox<f64>,
    pub task_status: Mailbox<TaskStatusUpdate>,
    pub mission_status: Mailbox<MissionStatusUpdate>,

    // Command issuer -> mission poller, inside the robot service.
    pub(crate) poller_arm: Mailbox<Mission>,
}

impl Events {
    pub fn new() -> Self {
        Self {
            start_mission: Mailbox::new("start_mission"),
            start_mission_ack: Mailbox::new("start_mission_ack"),
            stop_mission: Mailbox::new("stop_mission"),
            stop_mission_ack: Mailbox::new("stop_mission_ack"),
            pause_mission: Mailbox::new("pause_mission"),
            pause_mission_ack: Mailbox::new("pause_mission_ack"),
            resume_mission: Mailbox::new("resume_mission"),
            resume_mission_ack: Mailbox::new("resume_mission_ack"),
            return_home: Mailbox::new("return_home"),
            return_home_ack: Mailbox::new("return_home_ack"),
            release_intervention: Mailbox::new("release_intervention"),
            release_intervention_ack: Mailbox::new("release_intervention_ack"),
            maintenance_mode: Mailbox::new("maintenance_mode"),
            maintenance_mode_ack: Mailbox::new("maintenance_mode_ack"),
            lockdown: Mailbox::new("lockdown"),
            lockdown_ack: Mailbox::new("lockdown_ack"),
            current_state: Mailbox::new("current_state"),
            mission_handoff: Mailbox::new("mission_handoff"),
            stop_directive: Mailbox::new("stop_directive"),
            pause_directive: Mailbox::new("pause_directive"),
            resume_directive: Mailbox::new("resume_directive"),
            poller_reset: Mailbox::new("poller_reset"),
            initiate_ack: Mailbox::new("initiate_ack"),
            stop_ack: Mailbox::new("stop_ack"),
            pause_ack: Mailbox::new("pause_ack"),
            resume_ack: Mailbox::new("resume_ack"),
            robot_status: Mailbox::new("robot_status"),
            battery_level: Mailbox::new("battery_level"),
            task_status: Mailbox::new("task_status"),
            mission_status: Mailbox::new("mission_status"),
            poller_arm: Mailbox::new("poller_arm"),
        }
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}
