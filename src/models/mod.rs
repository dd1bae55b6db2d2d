//! Mission/Task domain model.
//!
//! Immutable-shaped records describing a mission, its ordered tasks, and
//! their status lifecycle. A `Mission` is owned exclusively by the state
//! machine while active; a deep copy (`Clone`, every field is owned) is
//! taken whenever it crosses into another thread.

mod mission;
mod task;

pub use mission::{Mission, MissionStatus};
pub use task::{Task, TaskStatus, TaskType};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MissionId = Uuid;
pub type TaskId = Uuid;
pub type InspectionId = Uuid;

/// A pose in the robot's map frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Heading in radians.
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self { x, y, z, yaw }
    }
}
