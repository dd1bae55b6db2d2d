//! The blocking boundary to the robot vendor API.

use serde::{Deserialize, Serialize};

use crate::error::ErrorMessage;
use crate::models::{Mission, MissionId, MissionStatus, Pose, TaskId, TaskStatus};

/// High-level status reported by the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    /// At the home/charging position and ready.
    Home,
    /// Ready for work, away from home.
    Available,
    /// Executing something.
    Busy,
    /// Not reachable or powered down.
    Offline,
    /// Halted by a protective stop.
    BlockedProtectiveStop,
}

/// Vendor-driver boundary. Every method may block; callers must run them on
/// a blocking-capable worker (see [`crate::robot::RobotRequest`]), never on
/// the state machine task.
///
/// Implementations never panic across this boundary: every failure is an
/// [`ErrorMessage`] with a reason tag from the closed taxonomy.
pub trait RobotDriver: Send + Sync + 'static {
    /// Hand a mission to the robot and start executing it.
    fn initiate_mission(
        &self,
        mission: &Mission,
        initial_pose: Option<Pose>,
    ) -> Result<(), ErrorMessage>;

    /// Stop whatever the robot is doing.
    fn stop(&self) -> Result<(), ErrorMessage>;

    /// Pause the current mission.
    fn pause(&self) -> Result<(), ErrorMessage>;

    /// Resume a paused mission.
    fn resume(&self) -> Result<(), ErrorMessage>;

    /// Current robot status.
    fn robot_status(&self) -> Result<RobotStatus, ErrorMessage>;

    /// Battery level in percent (0..=100).
    fn battery_level(&self) -> Result<f64, ErrorMessage>;

    /// Status of one task of the mission the robot is executing.
    fn task_status(&self, task_id: TaskId) -> Result<TaskStatus, ErrorMessage>;

    /// Status of the mission the robot is executing.
    fn mission_status(&self, mission_id: MissionId) -> Result<MissionStatus, ErrorMessage>;
}
