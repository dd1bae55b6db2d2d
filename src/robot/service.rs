//! Robot communication service.
//!
//! A set of independent pollers (robot status, battery, task/mission status)
//! plus a command issuer, owning all direct calls into the robot driver.
//! Each concern runs on its own task; coordination with the state machine is
//! exclusively via mailboxes, never a shared lock.
//!
//! Failure policy: transient communication failures are retried with a fixed
//! reconnect delay up to a per-concern limit, after which the failure is
//! reported as a terminal task/mission failure (or an offline status) rather
//! than retried indefinitely.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ErrorMessage;
use crate::events::{Events, MissionStatusUpdate, TaskStatusUpdate};
use crate::models::{Mission, MissionStatus, Pose, TaskStatus};
use crate::robot::driver::{RobotDriver, RobotStatus};
use crate::robot::request::RobotRequest;

/// Handle to the running service tasks.
pub struct RobotService {
    handles: Vec<JoinHandle<()>>,
}

impl RobotService {
    /// Spawn all service tasks. They stop when `cancel` is cancelled.
    pub fn spawn(
        driver: Arc<dyn RobotDriver>,
        events: Arc<Events>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        let handles = vec![
            tokio::spawn(poll_robot_status(
                Arc::clone(&driver),
                Arc::clone(&events),
                config.clone(),
                cancel.clone(),
            )),
            tokio::spawn(poll_battery(
                Arc::clone(&driver),
                Arc::clone(&events),
                config.clone(),
                cancel.clone(),
            )),
            tokio::spawn(poll_mission(
                Arc::clone(&driver),
                Arc::clone(&events),
                config.clone(),
                cancel.clone(),
            )),
            tokio::spawn(issue_commands(driver, events, config.clone(), cancel)),
        ];
        Self { handles }
    }

    /// Wait for all service tasks to finish (after cancellation).
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Sleep that wakes early on cancellation. Returns false when cancelled.
async fn idle(cancel: &CancellationToken, delay: std::time::Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn call_blocking<T: Send + 'static>(
    driver: &Arc<dyn RobotDriver>,
    call: impl FnOnce(&dyn RobotDriver) -> Result<T, ErrorMessage> + Send + 'static,
) -> Result<T, ErrorMessage> {
    let driver = Arc::clone(driver);
    match tokio::task::spawn_blocking(move || call(driver.as_ref())).await {
        Ok(result) => result,
        Err(e) => Err(ErrorMessage::unknown(format!(
            "robot call worker failed: {e}"
        ))),
    }
}

/// Poll robot status at a fixed interval; publish changes, not every poll.
async fn poll_robot_status(
    driver: Arc<dyn RobotDriver>,
    events: Arc<Events>,
    config: Config,
    cancel: CancellationToken,
) {
    let mut last: Option<RobotStatus> = None;
    let mut failures: u32 = 0;
    while !cancel.is_cancelled() {
        match call_blocking(&driver, |d| d.robot_status()).await {
            Ok(status) => {
                failures = 0;
                if last != Some(status) {
                    debug!(?status, "Robot status changed");
                    events.robot_status.trigger(status);
                    last = Some(status);
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= config.status_failure_limit {
                    error!(error = %e, failures, "Robot status polling exhausted, reporting offline");
                    if last != Some(RobotStatus::Offline) {
                        events.robot_status.trigger(RobotStatus::Offline);
                        last = Some(RobotStatus::Offline);
                    }
                    failures = 0;
                } else {
                    warn!(error = %e, failures, "Robot status poll failed");
                }
            }
        }
        let delay = if failures > 0 {
            config.reconnect_delay
        } else {
            config.robot_status_poll_interval
        };
        if !idle(&cancel, delay).await {
            break;
        }
    }
}

/// Poll battery level at a fixed interval; publish every reading.
async fn poll_battery(
    driver: Arc<dyn RobotDriver>,
    events: Arc<Events>,
    config: Config,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    while !cancel.is_cancelled() {
        match call_blocking(&driver, |d| d.battery_level()).await {
            Ok(level) => {
                failures = 0;
                events.battery_level.update(level);
            }
            Err(e) => {
                failures += 1;
                if failures >= config.status_failure_limit {
                    error!(error = %e, failures, "Battery polling keeps failing");
                    failures = 0;
                } else {
                    warn!(error = %e, failures, "Battery poll failed");
                }
            }
        }
        let delay = if failures > 0 {
            config.reconnect_delay
        } else {
            config.battery_poll_interval
        };
        if !idle(&cancel, delay).await {
            break;
        }
    }
}

/// Poll task and mission status once a mission has been handed off.
///
/// Armed by the command issuer after a successful initiate; disarmed when
/// the mission finishes, a poller reset arrives, or the service stops.
async fn poll_mission(
    driver: Arc<dyn RobotDriver>,
    events: Arc<Events>,
    config: Config,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let Some(mut mission) = events.poller_arm.try_consume() else {
            if !idle(&cancel, config.mission_poll_interval).await {
                break;
            }
            continue;
        };
        // A reset from before this mission is stale.
        events.poller_reset.clear();
        info!(mission_id = %mission.id, "Mission poller armed");

        let mut task_failures: u32 = 0;
        let mut mission_failures: u32 = 0;
        let mut last_task: Option<(crate::models::TaskId, TaskStatus)> = None;
        let mut last_mission: Option<MissionStatus> = None;

        'mission: loop {
            if cancel.is_cancelled() || events.poller_reset.try_consume().is_some() {
                break 'mission;
            }

            // Task status for the first unfinished task, in mission order.
            if let Some(task) = mission.current_task() {
                let task_id = task.id;
                match call_blocking(&driver, move |d| d.task_status(task_id)).await {
                    Ok(status) => {
                        task_failures = 0;
                        if last_task != Some((task_id, status)) {
                            events.task_status.trigger(TaskStatusUpdate {
                                task_id,
                                status,
                                error: None,
                            });
                            last_task = Some((task_id, status));
                        }
                        if let Some(local) = mission.task_mut(task_id) {
                            local.set_status(status, None);
                        }
                    }
                    Err(e) => {
                        task_failures += 1;
                        if task_failures >= config.task_failure_limit {
                            error!(
                                %task_id, error = %e,
                                "Task status polling exhausted, failing task"
                            );
                            events.task_status.trigger(TaskStatusUpdate {
                                task_id,
                                status: TaskStatus::Failed,
                                error: Some(e.clone()),
                            });
                            if let Some(local) = mission.task_mut(task_id) {
                                local.set_status(TaskStatus::Failed, Some(e));
                            }
                            task_failures = 0;
                            last_task = Some((task_id, TaskStatus::Failed));
                        } else {
                            warn!(%task_id, error = %e, task_failures, "Task status poll failed");
                        }
                    }
                }
            }

            // Mission status, with its own failure counter.
            let mission_id = mission.id;
            match call_blocking(&driver, move |d| d.mission_status(mission_id)).await {
                Ok(status) => {
                    mission_failures = 0;
                    if last_mission != Some(status) {
                        events.mission_status.trigger(MissionStatusUpdate {
                            mission_id,
                            status,
                            error: None,
                        });
                        last_mission = Some(status);
                    }
                    if status.is_finished() {
                        break 'mission;
                    }
                }
                Err(e) => {
                    mission_failures += 1;
                    if mission_failures >= config.mission_failure_limit {
                        error!(
                            %mission_id, error = %e,
                            "Mission status polling exhausted, failing mission"
                        );
                        events.mission_status.trigger(MissionStatusUpdate {
                            mission_id,
                            status: MissionStatus::Failed,
                            error: Some(e),
                        });
                        break 'mission;
                    }
                    warn!(%mission_id, error = %e, mission_failures, "Mission status poll failed");
                }
            }

            let delay = if task_failures > 0 || mission_failures > 0 {
                config.reconnect_delay
            } else {
                config.mission_poll_interval
            };
            if !idle(&cancel, delay).await {
                break 'mission;
            }
        }
        info!(mission_id = %mission.id, "Mission poller disarmed");
    }
}

/// An imperative command on its way to the robot.
enum Command {
    Initiate {
        mission: Mission,
        initial_pose: Option<Pose>,
    },
    Stop,
    Pause,
    Resume,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Initiate { .. } => "initiate",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
        }
    }
}

struct InFlight {
    command: Command,
    attempts: u32,
    request: RobotRequest<()>,
}

fn spawn_command(driver: &Arc<dyn RobotDriver>, command: &Command) -> RobotRequest<()> {
    let driver = Arc::clone(driver);
    match command {
        Command::Initiate {
            mission,
            initial_pose,
        } => {
            let mission = mission.clone();
            let pose = *initial_pose;
            RobotRequest::spawn(move || driver.initiate_mission(&mission, pose))
        }
        Command::Stop => RobotRequest::spawn(move || driver.stop()),
        Command::Pause => RobotRequest::spawn(move || driver.pause()),
        Command::Resume => RobotRequest::spawn(move || driver.resume()),
    }
}

/// Consume command directives and issue them through the request-wrapper.
///
/// At most one command is in flight at a time; completion is polled, never
/// awaited, so a hung driver call cannot wedge directive intake forever
/// (the worker is left to finish on its own after cancellation).
async fn issue_commands(
    driver: Arc<dyn RobotDriver>,
    events: Arc<Events>,
    config: Config,
    cancel: CancellationToken,
) {
    let mut current: Option<InFlight> = None;
    while !cancel.is_cancelled() {
        if let Some(mut inflight) = current.take() {
            match inflight.request.try_result().await {
                None => current = Some(inflight),
                Some(Ok(())) => {
                    info!(command = inflight.command.name(), "Robot command succeeded");
                    match &inflight.command {
                        Command::Initiate { mission, .. } => {
                            events.poller_arm.trigger(mission.clone());
                            events.initiate_ack.trigger(Ok(()));
                        }
                        Command::Stop => events.stop_ack.trigger(Ok(())),
                        Command::Pause => events.pause_ack.trigger(Ok(())),
                        Command::Resume => events.resume_ack.trigger(Ok(())),
                    }
                }
                Some(Err(e)) => {
                    inflight.attempts += 1;
                    if inflight.attempts <= config.command_retry_limit {
                        warn!(
                            command = inflight.command.name(),
                            attempts = inflight.attempts,
                            error = %e,
                            "Robot command failed, retrying"
                        );
                        if !idle(&cancel, config.reconnect_delay).await {
                            break;
                        }
                        inflight.request = spawn_command(&driver, &inflight.command);
                        current = Some(inflight);
                    } else {
                        error!(
                            command = inflight.command.name(),
                            attempts = inflight.attempts,
                            error = %e,
                            "Robot command failed terminally"
                        );
                        let ack = match &inflight.command {
                            Command::Initiate { .. } => &events.initiate_ack,
                            Command::Stop => &events.stop_ack,
                            Command::Pause => &events.pause_ack,
                            Command::Resume => &events.resume_ack,
                        };
                        ack.trigger(Err(e));
                    }
                }
            }
        } else if events.stop_directive.try_consume().is_some() {
            current = Some(start(&driver, Command::Stop));
        } else if events.pause_directive.try_consume().is_some() {
            current = Some(start(&driver, Command::Pause));
        } else if events.resume_directive.try_consume().is_some() {
            current = Some(start(&driver, Command::Resume));
        } else if let Some(handoff) = events.mission_handoff.try_consume() {
            current = Some(start(
                &driver,
                Command::Initiate {
                    mission: handoff.mission,
                    initial_pose: handoff.initial_pose,
                },
            ));
        }

        if !idle(&cancel, config.step_interval).await {
            break;
        }
    }
}

fn start(driver: &Arc<dyn RobotDriver>, command: Command) -> InFlight {
    debug!(command = command.name(), "Issuing robot command");
    InFlight {
        request: spawn_command(driver, &command),
        command,
        attempts: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MissionHandoff;
    use crate::models::{Task, TaskType};
    use crate::robot::simulator::SimulatorDriver;
    use std::time::Duration;

    fn test_config() -> Config {
        Config::for_tests(std::path::PathBuf::from("unused.json"))
    }

    async fn wait_for<T>(
        mailbox: &crate::mailbox::Mailbox<T>,
        timeout: Duration,
    ) -> T {
        mailbox
            .consume(timeout)
            .await
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[tokio::test]
    async fn handoff_initiates_and_arms_mission_poller() {
        let driver = Arc::new(SimulatorDriver::new());
        driver.set_polls_per_task(1);
        let events = Arc::new(Events::new());
        let cancel = CancellationToken::new();
        let service = RobotService::spawn(
            driver.clone() as Arc<dyn RobotDriver>,
            Arc::clone(&events),
            &test_config(),
            cancel.clone(),
        );

        let mission = Mission::new("m", vec![Task::new(TaskType::ReturnToHome)]);
        events.mission_handoff.trigger(MissionHandoff {
            mission: mission.clone(),
            initial_pose: None,
        });

        let ack = wait_for(&events.initiate_ack, Duration::from_secs(2)).await;
        assert!(ack.is_ok());

        // The poller reports the task through to success and finishes the
        // mission.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(update) = events.mission_status.check() {
                if update.status == MissionStatus::Successful {
                    break;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "mission never finished");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        service.join().await;
    }

    #[tokio::test]
    async fn transient_stop_failure_is_retried() {
        let driver = Arc::new(SimulatorDriver::new());
        driver.fail_next_stops(1);
        let events = Arc::new(Events::new());
        let cancel = CancellationToken::new();
        let service = RobotService::spawn(
            driver.clone() as Arc<dyn RobotDriver>,
            Arc::clone(&events),
            &test_config(),
            cancel.clone(),
        );

        events.stop_directive.trigger(());
        let ack = wait_for(&events.stop_ack, Duration::from_secs(2)).await;
        assert!(ack.is_ok());
        assert_eq!(driver.stop_call_count(), 2);

        cancel.cancel();
        service.join().await;
    }

    #[tokio::test]
    async fn exhausted_retries_publish_failure_ack() {
        let driver = Arc::new(SimulatorDriver::new());
        driver.fail_next_stops(100);
        let events = Arc::new(Events::new());
        let cancel = CancellationToken::new();
        let mut config = test_config();
        config.command_retry_limit = 2;
        let service = RobotService::spawn(
            driver.clone() as Arc<dyn RobotDriver>,
            Arc::clone(&events),
            &config,
            cancel.clone(),
        );

        events.stop_directive.trigger(());
        let ack = wait_for(&events.stop_ack, Duration::from_secs(2)).await;
        let err = ack.expect_err("stop should fail terminally");
        assert_eq!(err.reason, crate::error::ErrorReason::ActionFailure);
        // First attempt plus two retries.
        assert_eq!(driver.stop_call_count(), 3);

        cancel.cancel();
        service.join().await;
    }

    #[tokio::test]
    async fn robot_status_published_on_change_only() {
        let driver = Arc::new(SimulatorDriver::new());
        let events = Arc::new(Events::new());
        let cancel = CancellationToken::new();
        let service = RobotService::spawn(
            driver.clone() as Arc<dyn RobotDriver>,
            Arc::clone(&events),
            &test_config(),
            cancel.clone(),
        );

        let status = wait_for(&events.robot_status, Duration::from_secs(2)).await;
        assert_eq!(status, RobotStatus::Available);

        // No change, so nothing new should be published.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!events.robot_status.has_event());

        driver.set_robot_status(RobotStatus::Home);
        let status = wait_for(&events.robot_status, Duration::from_secs(2)).await;
        assert_eq!(status, RobotStatus::Home);

        cancel.cancel();
        service.join().await;
    }
}
