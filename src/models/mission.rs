//! Missions: an ordered set of tasks executed on the robot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorMessage;
use crate::models::{MissionId, Task, TaskId, TaskStatus};

/// Status of a mission as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    NotStarted,
    InProgress,
    Paused,
    PartiallySuccessful,
    Successful,
    Failed,
    Cancelled,
}

impl MissionStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            MissionStatus::Successful
                | MissionStatus::PartiallySuccessful
                | MissionStatus::Failed
                | MissionStatus::Cancelled
        )
    }
}

/// An ordered set of tasks to execute on the robot.
///
/// Owned by the state machine thread while active. All fields are owned, so
/// `Clone` is the deep copy handed to other threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub tasks: Vec<Task>,
    pub status: MissionStatus,
    pub error: Option<ErrorMessage>,
    pub metadata: Option<serde_json::Value>,
}

impl Mission {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tasks,
            status: MissionStatus::NotStarted,
            error: None,
            metadata: None,
        }
    }

    pub fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// First task that has not reached a finished status, in mission order.
    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| !t.is_finished())
    }

    pub fn all_tasks_finished(&self) -> bool {
        self.tasks.iter().all(Task::is_finished)
    }

    /// Derive the terminal mission status from the task statuses.
    ///
    /// All successful → Successful; none successful → Failed; otherwise
    /// PartiallySuccessful. Cancelled tasks count as unsuccessful.
    pub fn derive_terminal_status(&self) -> MissionStatus {
        let successful = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Successful)
            .count();
        if successful == self.tasks.len() {
            MissionStatus::Successful
        } else if successful == 0 {
            MissionStatus::Failed
        } else {
            MissionStatus::PartiallySuccessful
        }
    }

    /// Cancel every task that has not already finished.
    pub fn cancel_unfinished_tasks(&mut self) {
        for task in &mut self.tasks {
            task.set_status(TaskStatus::Cancelled, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;

    fn mission_with_statuses(statuses: &[TaskStatus]) -> Mission {
        let tasks = statuses
            .iter()
            .map(|&s| {
                let mut t = Task::new(TaskType::ReturnToHome);
                t.status = s;
                t
            })
            .collect();
        Mission::new("test", tasks)
    }

    #[test]
    fn terminal_status_all_successful() {
        let m = mission_with_statuses(&[TaskStatus::Successful, TaskStatus::Successful]);
        assert_eq!(m.derive_terminal_status(), MissionStatus::Successful);
    }

    #[test]
    fn terminal_status_none_successful() {
        let m = mission_with_statuses(&[TaskStatus::Failed, TaskStatus::Cancelled]);
        assert_eq!(m.derive_terminal_status(), MissionStatus::Failed);
    }

    #[test]
    fn terminal_status_mixed() {
        let m = mission_with_statuses(&[TaskStatus::Successful, TaskStatus::Failed]);
        assert_eq!(m.derive_terminal_status(), MissionStatus::PartiallySuccessful);
    }

    #[test]
    fn current_task_is_first_unfinished() {
        let m = mission_with_statuses(&[
            TaskStatus::Successful,
            TaskStatus::InProgress,
            TaskStatus::NotStarted,
        ]);
        let current = m.current_task().expect("one unfinished task");
        assert_eq!(current.status, TaskStatus::InProgress);
    }

    #[test]
    fn cancel_unfinished_leaves_finished_tasks_alone() {
        let mut m = mission_with_statuses(&[TaskStatus::Successful, TaskStatus::InProgress]);
        m.cancel_unfinished_tasks();
        assert_eq!(m.tasks[0].status, TaskStatus::Successful);
        assert_eq!(m.tasks[1].status, TaskStatus::Cancelled);
    }
}
