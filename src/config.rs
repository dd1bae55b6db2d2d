//! Configuration for the supervisor.
//!
//! One immutable struct passed to the state machine and robot service at
//! construction time; there is no global mutable state. All values can be
//! set via environment variables:
//! - `STEP_INTERVAL_MS` - State machine polling interval. Defaults to `100`.
//! - `ROBOT_STATUS_POLL_INTERVAL_MS` - Defaults to `1000`.
//! - `BATTERY_POLL_INTERVAL_MS` - Defaults to `5000`.
//! - `MISSION_POLL_INTERVAL_MS` - Task/mission status polling. Defaults to `1000`.
//! - `RECONNECT_DELAY_MS` - Delay between retries after a communication
//!   failure. Defaults to `2000`.
//! - `STATUS_FAILURE_LIMIT` / `TASK_FAILURE_LIMIT` / `MISSION_FAILURE_LIMIT` -
//!   Consecutive poll failures tolerated before escalation. Default `10`.
//! - `COMMAND_RETRY_LIMIT` - Retries per robot command inside the
//!   communication service. Defaults to `3`.
//! - `INITIATE_RETRY_LIMIT` / `STOP_RETRY_LIMIT` / `PAUSE_RETRY_LIMIT` -
//!   Re-issue limits applied by the states. Default `3`.
//! - `JOURNEY_RETRY_LIMIT` - Attempts for return-home/recharge/lockdown
//!   journeys before escalating to intervention. Defaults to `3`.
//! - `BATTERY_START_THRESHOLD` - Minimum battery percentage to start a
//!   mission (inclusive: exactly at the threshold is sufficient).
//!   Defaults to `30`.
//! - `BATTERY_RECHARGED_LEVEL` - Level at which recharging ends. Defaults
//!   to `80`.
//! - `IDLE_TIMEOUT_S` - Idle time before the robot is sent home. Defaults
//!   to `3600`.
//! - `ACK_TIMEOUT_MS` - How long the command surface waits for an
//!   acknowledgement. Defaults to `10000`.
//! - `MODE_FILE` - Path of the persisted operating-mode file. Defaults to
//!   `operating_mode.json`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::Pose;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sleep between state machine polling iterations. Deliberate
    /// backpressure, not busy-waiting.
    pub step_interval: Duration,
    pub robot_status_poll_interval: Duration,
    pub battery_poll_interval: Duration,
    pub mission_poll_interval: Duration,
    /// Delay before retrying after a communication failure.
    pub reconnect_delay: Duration,

    /// Consecutive robot-status poll failures before the robot is reported
    /// offline.
    pub status_failure_limit: u32,
    /// Consecutive task-status poll failures before the task is failed.
    pub task_failure_limit: u32,
    /// Consecutive mission-status poll failures before the mission is failed.
    pub mission_failure_limit: u32,
    /// Retries per imperative robot command inside the communication service.
    pub command_retry_limit: u32,
    /// Re-initiate attempts before a mission is escalated.
    pub initiate_retry_limit: u32,
    /// Stop re-issue attempts before a stop is declared failed.
    pub stop_retry_limit: u32,
    /// Pause/resume re-issue attempts before the request is rejected.
    pub pause_retry_limit: u32,
    /// Journey (return-home, recharge, lockdown) attempts before
    /// InterventionNeeded.
    pub journey_retry_limit: u32,

    /// Minimum battery percentage to start a mission. Inclusive boundary:
    /// a level exactly at the threshold is sufficient.
    pub battery_start_threshold: f64,
    /// Battery percentage at which recharging is considered done.
    pub battery_recharged_level: f64,

    /// How long an idle robot waits before returning home.
    pub idle_timeout: Duration,
    /// How long the command surface waits for an acknowledgement.
    pub ack_timeout: Duration,

    /// Capacity of the transition-history log (diagnostics only).
    pub history_capacity: usize,

    /// Path of the persisted operating-mode file.
    pub mode_file: PathBuf,

    /// Where the recharge journey drives to.
    pub recharge_pose: Pose,
    /// Where the lockdown journey drives to.
    pub lockdown_pose: Pose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(100),
            robot_status_poll_interval: Duration::from_millis(1000),
            battery_poll_interval: Duration::from_millis(5000),
            mission_poll_interval: Duration::from_millis(1000),
            reconnect_delay: Duration::from_millis(2000),
            status_failure_limit: 10,
            task_failure_limit: 10,
            mission_failure_limit: 10,
            command_retry_limit: 3,
            initiate_retry_limit: 3,
            stop_retry_limit: 3,
            pause_retry_limit: 3,
            journey_retry_limit: 3,
            battery_start_threshold: 30.0,
            battery_recharged_level: 80.0,
            idle_timeout: Duration::from_secs(3600),
            ack_timeout: Duration::from_millis(10_000),
            history_capacity: 32,
            mode_file: PathBuf::from("operating_mode.json"),
            recharge_pose: Pose::default(),
            lockdown_pose: Pose::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            step_interval: env_millis("STEP_INTERVAL_MS", defaults.step_interval)?,
            robot_status_poll_interval: env_millis(
                "ROBOT_STATUS_POLL_INTERVAL_MS",
                defaults.robot_status_poll_interval,
            )?,
            battery_poll_interval: env_millis(
                "BATTERY_POLL_INTERVAL_MS",
                defaults.battery_poll_interval,
            )?,
            mission_poll_interval: env_millis(
                "MISSION_POLL_INTERVAL_MS",
                defaults.mission_poll_interval,
            )?,
            reconnect_delay: env_millis("RECONNECT_DELAY_MS", defaults.reconnect_delay)?,
            status_failure_limit: env_parse("STATUS_FAILURE_LIMIT", defaults.status_failure_limit)?,
            task_failure_limit: env_parse("TASK_FAILURE_LIMIT", defaults.task_failure_limit)?,
            mission_failure_limit: env_parse(
                "MISSION_FAILURE_LIMIT",
                defaults.mission_failure_limit,
            )?,
            command_retry_limit: env_parse("COMMAND_RETRY_LIMIT", defaults.command_retry_limit)?,
            initiate_retry_limit: env_parse("INITIATE_RETRY_LIMIT", defaults.initiate_retry_limit)?,
            stop_retry_limit: env_parse("STOP_RETRY_LIMIT", defaults.stop_retry_limit)?,
            pause_retry_limit: env_parse("PAUSE_RETRY_LIMIT", defaults.pause_retry_limit)?,
            journey_retry_limit: env_parse("JOURNEY_RETRY_LIMIT", defaults.journey_retry_limit)?,
            battery_start_threshold: env_parse(
                "BATTERY_START_THRESHOLD",
                defaults.battery_start_threshold,
            )?,
            battery_recharged_level: env_parse(
                "BATTERY_RECHARGED_LEVEL",
                defaults.battery_recharged_level,
            )?,
            idle_timeout: env_secs("IDLE_TIMEOUT_S", defaults.idle_timeout)?,
            ack_timeout: env_millis("ACK_TIMEOUT_MS", defaults.ack_timeout)?,
            history_capacity: env_parse("HISTORY_CAPACITY", defaults.history_capacity)?,
            mode_file: std::env::var("MODE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.mode_file),
            recharge_pose: defaults.recharge_pose,
            lockdown_pose: defaults.lockdown_pose,
        })
    }

    /// Fast intervals for tests.
    pub fn for_tests(mode_file: PathBuf) -> Self {
        Self {
            step_interval: Duration::from_millis(5),
            robot_status_poll_interval: Duration::from_millis(10),
            battery_poll_interval: Duration::from_millis(10),
            mission_poll_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(5),
            idle_timeout: Duration::from_secs(600),
            ack_timeout: Duration::from_millis(2000),
            mode_file,
            ..Self::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(env_parse(
        name,
        default.as_millis() as u64,
    )?))
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(env_parse(name, default.as_secs())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.step_interval, Duration::from_millis(100));
        assert!(config.battery_start_threshold < config.battery_recharged_level);
        assert!(config.history_capacity > 0);
    }

    #[test]
    fn test_profile_uses_fast_intervals() {
        let config = Config::for_tests(PathBuf::from("mode.json"));
        assert!(config.step_interval < Duration::from_millis(50));
        assert_eq!(config.mode_file, PathBuf::from("mode.json"));
    }
}
