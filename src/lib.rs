//! Supervisory controller for single-robot mission execution.
//!
//! The supervisor sits between upstream mission sources and one inspection
//! robot. It owns the mission lifecycle: accepting or rejecting mission
//! commands, watching the robot while a mission runs, pausing, resuming and
//! stopping on request, sending the robot home or to the charger when idle
//! or low on battery, and honoring maintenance and lockdown modes across
//! restarts.
//!
//! Three pieces cooperate, connected only by single-slot mailboxes:
//! - the state machine ([`machine`]), one task that owns the active mission
//!   and steps the current [`machine::states::State`] on a fixed interval;
//! - the robot communication service ([`robot`]), a set of poller tasks and
//!   a command issuer wrapping the blocking [`robot::RobotDriver`];
//! - the command surface ([`control::SupervisorHandle`]), which turns
//!   request/acknowledgement mailbox pairs into plain async calls.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod machine;
pub mod mailbox;
pub mod mode_store;
pub mod models;
pub mod robot;
pub mod telemetry;

pub use config::Config;
pub use control::SupervisorHandle;
pub use error::{ErrorMessage, ErrorReason};
pub use events::{Ack, Events, ModeRequest};
pub use machine::StateMachine;
pub use mailbox::{Mailbox, MailboxTimeout};
pub use models::{Mission, MissionStatus, Pose, Task, TaskStatus, TaskType};
pub use robot::{RobotDriver, RobotService, RobotStatus, SimulatorDriver};
