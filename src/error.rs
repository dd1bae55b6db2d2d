//! Closed error taxonomy for everything the robot boundary can report.
//!
//! The robot communication service never panics or throws across a mailbox:
//! every failure becomes an [`ErrorMessage`] value. Control decisions switch
//! on the [`ErrorReason`] tag only; the description is for operators and
//! logs, never for policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason tag for a failure reported at the robot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Could not reach the robot at all.
    CommunicationFailure,
    /// The robot was reachable but did not answer in time.
    CommunicationTimeout,
    /// The mission or task cannot be executed by this robot.
    InfeasibleMission,
    /// Battery too low for the requested operation.
    LowBattery,
    /// Pneumatic/hydraulic pressure too low for the requested operation.
    LowPressure,
    /// The robot accepted the action but failed to carry it out.
    ActionFailure,
    /// A mission-scoped command arrived while no mission was running.
    NoMissionRunning,
    /// Anything the driver could not classify.
    Unknown,
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorReason::CommunicationFailure => "communication_failure",
            ErrorReason::CommunicationTimeout => "communication_timeout",
            ErrorReason::InfeasibleMission => "infeasible_mission",
            ErrorReason::LowBattery => "low_battery",
            ErrorReason::LowPressure => "low_pressure",
            ErrorReason::ActionFailure => "action_failure",
            ErrorReason::NoMissionRunning => "no_mission_running",
            ErrorReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failure report: a closed reason tag plus a human description.
///
/// Produced at the robot driver boundary, carried unchanged through
/// mailboxes, and surfaced to operators in rejected acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason}: {description}")]
pub struct ErrorMessage {
    pub reason: ErrorReason,
    pub description: String,
}

impl ErrorMessage {
    pub fn new(reason: ErrorReason, description: impl Into<String>) -> Self {
        Self {
            reason,
            description: description.into(),
        }
    }

    pub fn communication_failure(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::CommunicationFailure, description)
    }

    pub fn communication_timeout(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::CommunicationTimeout, description)
    }

    pub fn infeasible(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::InfeasibleMission, description)
    }

    pub fn low_battery(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::LowBattery, description)
    }

    pub fn action_failure(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::ActionFailure, description)
    }

    pub fn no_mission_running(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::NoMissionRunning, description)
    }

    pub fn unknown(description: impl Into<String>) -> Self {
        Self::new(ErrorReason::Unknown, description)
    }
}
