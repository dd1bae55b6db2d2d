//! Scriptable in-process robot driver.
//!
//! Stands in for the physical robot in the binary's demo mode and in the
//! scenario tests. Each failure mode the supervisor has to handle can be
//! scripted: initiate/stop/pause/resume failures, communication loss, slow
//! stop acknowledgement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::error::ErrorMessage;
use crate::models::{Mission, MissionId, MissionStatus, Pose, TaskId, TaskStatus, TaskType};
use crate::robot::driver::{RobotDriver, RobotStatus};

#[derive(Debug)]
struct Sim {
    robot_status: RobotStatus,
    battery: f64,
    battery_jitter: bool,
    mission: Option<Mission>,
    /// Polls a task stays in progress before turning successful.
    polls_per_task: u32,
    task_polls: HashMap<TaskId, u32>,
    mission_outcome: Option<MissionStatus>,
    paused: bool,
    comm_down: bool,
    initiate_failures: u32,
    stop_failures: u32,
    pause_failures: u32,
    resume_failures: u32,
    stop_delay: Duration,
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            robot_status: RobotStatus::Available,
            battery: 90.0,
            battery_jitter: false,
            mission: None,
            polls_per_task: 2,
            task_polls: HashMap::new(),
            mission_outcome: None,
            paused: false,
            comm_down: false,
            initiate_failures: 0,
            stop_failures: 0,
            pause_failures: 0,
            resume_failures: 0,
            stop_delay: Duration::ZERO,
        }
    }
}

/// Simulated robot. Cheap to share: all mutability is interior.
pub struct SimulatorDriver {
    sim: Mutex<Sim>,
    initiate_calls: AtomicU32,
    stop_calls: AtomicU32,
}

impl SimulatorDriver {
    pub fn new() -> Self {
        Self {
            sim: Mutex::new(Sim::default()),
            initiate_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
        }
    }

    fn sim(&self) -> std::sync::MutexGuard<'_, Sim> {
        self.sim.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Scripting knobs, used by tests and the demo binary.

    pub fn set_robot_status(&self, status: RobotStatus) {
        self.sim().robot_status = status;
    }

    pub fn set_battery(&self, level: f64) {
        self.sim().battery = level;
    }

    pub fn enable_battery_jitter(&self) {
        self.sim().battery_jitter = true;
    }

    pub fn set_comm_down(&self, down: bool) {
        self.sim().comm_down = down;
    }

    pub fn set_polls_per_task(&self, polls: u32) {
        self.sim().polls_per_task = polls;
    }

    pub fn fail_next_initiates(&self, count: u32) {
        self.sim().initiate_failures = count;
    }

    pub fn fail_next_stops(&self, count: u32) {
        self.sim().stop_failures = count;
    }

    pub fn fail_next_pauses(&self, count: u32) {
        self.sim().pause_failures = count;
    }

    pub fn fail_next_resumes(&self, count: u32) {
        self.sim().resume_failures = count;
    }

    /// Make every stop call take this long before answering.
    pub fn set_stop_delay(&self, delay: Duration) {
        self.sim().stop_delay = delay;
    }

    pub fn initiate_call_count(&self) -> u32 {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn stop_call_count(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn comm_error() -> ErrorMessage {
        ErrorMessage::communication_failure("simulated link down")
    }
}

impl Default for SimulatorDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotDriver for SimulatorDriver {
    fn initiate_mission(
        &self,
        mission: &Mission,
        _initial_pose: Option<Pose>,
    ) -> Result<(), ErrorMessage> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.initiate_failures > 0 {
            sim.initiate_failures -= 1;
            return Err(ErrorMessage::infeasible("simulated initiate failure"));
        }
        sim.mission = Some(mission.clone());
        sim.task_polls.clear();
        sim.mission_outcome = None;
        sim.paused = false;
        sim.robot_status = RobotStatus::Busy;
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorMessage> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.sim().stop_delay;
        if !delay.is_zero() {
            // Deliberately blocking: this runs inside a request-wrapper worker.
            std::thread::sleep(delay);
        }
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.stop_failures > 0 {
            sim.stop_failures -= 1;
            return Err(ErrorMessage::action_failure("simulated stop failure"));
        }
        sim.mission_outcome = Some(MissionStatus::Cancelled);
        sim.paused = false;
        sim.robot_status = RobotStatus::Available;
        Ok(())
    }

    fn pause(&self) -> Result<(), ErrorMessage> {
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.pause_failures > 0 {
            sim.pause_failures -= 1;
            return Err(ErrorMessage::action_failure("simulated pause failure"));
        }
        sim.paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<(), ErrorMessage> {
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.resume_failures > 0 {
            sim.resume_failures -= 1;
            return Err(ErrorMessage::action_failure("simulated resume failure"));
        }
        sim.paused = false;
        Ok(())
    }

    fn robot_status(&self) -> Result<RobotStatus, ErrorMessage> {
        let sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        Ok(sim.robot_status)
    }

    fn battery_level(&self) -> Result<f64, ErrorMessage> {
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.battery_jitter {
            let jitter: f64 = rand::thread_rng().gen_range(-0.2..=0.2);
            sim.battery = (sim.battery + jitter).clamp(0.0, 100.0);
        }
        Ok(sim.battery)
    }

    fn task_status(&self, task_id: TaskId) -> Result<TaskStatus, ErrorMessage> {
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if sim.mission_outcome == Some(MissionStatus::Cancelled) {
            return Ok(TaskStatus::Cancelled);
        }
        if sim.paused {
            return Ok(TaskStatus::Paused);
        }
        let threshold = sim.polls_per_task;
        let polls = sim.task_polls.entry(task_id).or_insert(0);
        *polls += 1;
        if *polls > threshold {
            Ok(TaskStatus::Successful)
        } else {
            Ok(TaskStatus::InProgress)
        }
    }

    fn mission_status(&self, _mission_id: MissionId) -> Result<MissionStatus, ErrorMessage> {
        let mut sim = self.sim();
        if sim.comm_down {
            return Err(Self::comm_error());
        }
        if let Some(outcome) = sim.mission_outcome {
            return Ok(outcome);
        }
        if sim.paused {
            return Ok(MissionStatus::Paused);
        }
        let Some(mission) = sim.mission.as_ref() else {
            return Err(ErrorMessage::no_mission_running("no mission on the robot"));
        };
        let threshold = sim.polls_per_task;
        let done = mission
            .tasks
            .iter()
            .all(|t| sim.task_polls.get(&t.id).copied().unwrap_or(0) > threshold);
        if done {
            let went_home = mission
                .tasks
                .iter()
                .any(|t| matches!(t.kind, TaskType::ReturnToHome));
            sim.robot_status = if went_home {
                RobotStatus::Home
            } else {
                RobotStatus::Available
            };
            sim.mission_outcome = Some(MissionStatus::Successful);
            Ok(MissionStatus::Successful)
        } else {
            Ok(MissionStatus::InProgress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    #[test]
    fn mission_progresses_to_success() {
        let driver = SimulatorDriver::new();
        driver.set_polls_per_task(1);
        let mission = Mission::new("m", vec![Task::new(TaskType::ReturnToHome)]);
        driver.initiate_mission(&mission, None).expect("initiate");
        let task_id = mission.tasks[0].id;

        assert_eq!(driver.task_status(task_id), Ok(TaskStatus::InProgress));
        assert_eq!(driver.task_status(task_id), Ok(TaskStatus::Successful));
        assert_eq!(
            driver.mission_status(mission.id),
            Ok(MissionStatus::Successful)
        );
        // Return-home journeys leave the robot at home.
        assert_eq!(driver.robot_status(), Ok(RobotStatus::Home));
    }

    #[test]
    fn scripted_failures_decrement() {
        let driver = SimulatorDriver::new();
        driver.fail_next_stops(1);
        assert!(driver.stop().is_err());
        assert!(driver.stop().is_ok());
        assert_eq!(driver.stop_call_count(), 2);
    }

    #[test]
    fn comm_down_fails_every_poll() {
        let driver = SimulatorDriver::new();
        driver.set_comm_down(true);
        assert!(driver.robot_status().is_err());
        assert!(driver.battery_level().is_err());
        driver.set_comm_down(false);
        assert!(driver.robot_status().is_ok());
    }
}
