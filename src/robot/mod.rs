//! Everything that talks to the physical robot.
//!
//! The [`driver::RobotDriver`] trait is the blocking boundary to the robot
//! vendor API. All direct calls into it happen inside this module: the
//! [`service::RobotService`] pollers and command issuer, which run on their
//! own tasks and coordinate with the state machine exclusively via
//! mailboxes. Blocking calls are isolated behind [`request::RobotRequest`].

pub mod driver;
pub mod request;
pub mod service;
pub mod simulator;

pub use driver::{RobotDriver, RobotStatus};
pub use request::RobotRequest;
pub use service::RobotService;
pub use simulator::SimulatorDriver;
