//! Fire-and-forget boundary to telemetry and inspection upload.
//!
//! The core publishes a record on every state/mission/task status change and
//! hands completed inspections to an upload queue it does not otherwise
//! manage. Both channels are unbounded and send failures are ignored: a slow
//! or absent consumer must never stall the state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{InspectionId, Mission, MissionId, MissionStatus, Task, TaskStatus};

/// One status record published to telemetry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusRecord {
    StateChanged {
        state: String,
        timestamp: DateTime<Utc>,
    },
    MissionStatusChanged {
        mission_id: MissionId,
        name: String,
        status: MissionStatus,
        timestamp: DateTime<Utc>,
    },
    TaskStatusChanged {
        mission_id: MissionId,
        task_id: crate::models::TaskId,
        task_type: &'static str,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
}

/// A completed inspection handed to the upload pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct InspectionUpload {
    pub mission_id: MissionId,
    pub inspection_id: InspectionId,
    pub task: Task,
    pub timestamp: DateTime<Utc>,
}

/// Sender half of the telemetry boundary.
#[derive(Clone)]
pub struct TelemetryPublisher {
    records: mpsc::UnboundedSender<StatusRecord>,
    uploads: mpsc::UnboundedSender<InspectionUpload>,
}

/// Receiver half, owned by the external telemetry/storage collaborators.
pub struct TelemetryReceiver {
    pub records: mpsc::UnboundedReceiver<StatusRecord>,
    pub uploads: mpsc::UnboundedReceiver<InspectionUpload>,
}

/// Create a connected publisher/receiver pair.
pub fn channel() -> (TelemetryPublisher, TelemetryReceiver) {
    let (records_tx, records_rx) = mpsc::unbounded_channel();
    let (uploads_tx, uploads_rx) = mpsc::unbounded_channel();
    (
        TelemetryPublisher {
            records: records_tx,
            uploads: uploads_tx,
        },
        TelemetryReceiver {
            records: records_rx,
            uploads: uploads_rx,
        },
    )
}

impl TelemetryPublisher {
    pub fn publish_state(&self, state: &'static str) {
        let _ = self.records.send(StatusRecord::StateChanged {
            state: state.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn publish_mission(&self, mission: &Mission) {
        let _ = self.records.send(StatusRecord::MissionStatusChanged {
            mission_id: mission.id,
            name: mission.name.clone(),
            status: mission.status,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_task(&self, mission_id: MissionId, task: &Task) {
        let _ = self.records.send(StatusRecord::TaskStatusChanged {
            mission_id,
            task_id: task.id,
            task_type: task.kind.name(),
            status: task.status,
            timestamp: Utc::now(),
        });
    }

    /// Hand a completed inspection to the upload pipeline. The task is a
    /// deep copy; the caller keeps ownership of the mission.
    pub fn upload_inspection(&self, mission_id: MissionId, task: &Task) {
        let Some(inspection_id) = task.inspection_id else {
            return;
        };
        let _ = self.uploads.send(InspectionUpload {
            mission_id,
            inspection_id,
            task: task.clone(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;

    #[test]
    fn publishes_are_fire_and_forget() {
        let (publisher, receiver) = channel();
        drop(receiver);
        // Must not panic or block with the consumer gone.
        publisher.publish_state("Home");
    }

    #[tokio::test]
    async fn task_completion_reaches_upload_queue() {
        let (publisher, mut receiver) = channel();
        let mission = Mission::new(
            "inspect",
            vec![Task::new(TaskType::TakeImage {
                target: crate::models::Pose::default(),
            })],
        );
        publisher.upload_inspection(mission.id, &mission.tasks[0]);
        let upload = receiver.uploads.recv().await.expect("one upload");
        assert_eq!(upload.mission_id, mission.id);
        assert_eq!(upload.task.id, mission.tasks[0].id);
    }

    #[tokio::test]
    async fn tasks_without_inspection_are_not_uploaded() {
        let (publisher, mut receiver) = channel();
        let mission = Mission::new("drive", vec![Task::new(TaskType::ReturnToHome)]);
        publisher.upload_inspection(mission.id, &mission.tasks[0]);
        assert!(receiver.uploads.try_recv().is_err());
    }
}
