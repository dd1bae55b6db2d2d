//! Tasks: one unit of robot work with its own status lifecycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorMessage;
use crate::models::{InspectionId, Pose, TaskId};

/// What the robot is asked to do for one task.
///
/// One tagged variant per task kind, switched on explicitly wherever
/// behavior differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskType {
    DriveToPose { pose: Pose },
    TakeImage { target: Pose },
    TakeVideo { target: Pose, duration_s: f64 },
    ReturnToHome,
    MoveArm { arm_pose: String },
    RecordAudio { duration_s: f64 },
    TakeGasMeasurement { duration_s: f64 },
}

impl TaskType {
    /// Whether this task produces an inspection result to upload.
    pub fn produces_inspection(&self) -> bool {
        matches!(
            self,
            TaskType::TakeImage { .. }
                | TaskType::TakeVideo { .. }
                | TaskType::RecordAudio { .. }
                | TaskType::TakeGasMeasurement { .. }
        )
    }

    /// Short name for logs and telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::DriveToPose { .. } => "drive_to_pose",
            TaskType::TakeImage { .. } => "take_image",
            TaskType::TakeVideo { .. } => "take_video",
            TaskType::ReturnToHome => "return_to_home",
            TaskType::MoveArm { .. } => "move_arm",
            TaskType::RecordAudio { .. } => "record_audio",
            TaskType::TakeGasMeasurement { .. } => "take_gas_measurement",
        }
    }
}

/// Status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    Scheduled,
    InProgress,
    Successful,
    PartiallySuccessful,
    Failed,
    Cancelled,
    Paused,
}

impl TaskStatus {
    /// A task is finished iff its status is terminal. Finished statuses are
    /// never overwritten.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskStatus::Successful
                | TaskStatus::PartiallySuccessful
                | TaskStatus::Cancelled
                | TaskStatus::Failed
        )
    }
}

/// One unit of robot work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Identifier of the physical tag/asset this task targets, if any.
    pub tag_id: Option<String>,
    pub kind: TaskType,
    pub status: TaskStatus,
    pub inspection_id: Option<InspectionId>,
    pub error: Option<ErrorMessage>,
}

impl Task {
    pub fn new(kind: TaskType) -> Self {
        let inspection_id = kind.produces_inspection().then(Uuid::new_v4);
        Self {
            id: Uuid::new_v4(),
            tag_id: None,
            kind,
            status: TaskStatus::NotStarted,
            inspection_id,
            error: None,
        }
    }

    pub fn with_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_id = Some(tag_id.into());
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Apply a status reported by the robot communication service.
    ///
    /// Returns false (and changes nothing) if the task is already finished:
    /// a finished task is never resurrected.
    pub fn set_status(&mut self, status: TaskStatus, error: Option<ErrorMessage>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        true
    }
}
