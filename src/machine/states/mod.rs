//! The state catalogue.
//!
//! Each state is a small event-driven unit: `step` checks its mailboxes in
//! fixed priority order (statement order below is the priority order) and
//! the first handler that produces a transition wins the tick. States are
//! immutable in shape once constructed and are replaced wholesale on
//! transition; timers are `Instant` deadlines armed in `on_enter`.

mod idle;
mod intervention;
mod journey;
mod lockdown;
mod maintenance;
mod monitor;
mod pause;
mod recharge;
mod return_home;
mod stop;

pub use idle::{
    AwaitNextMission, BlockedProtectiveStop, Home, Offline, RobotStandingStill, UnknownStatus,
};
pub use intervention::InterventionNeeded;
pub use lockdown::{GoingToLockdown, Lockdown};
pub use maintenance::Maintenance;
pub use monitor::Monitor;
pub use pause::{Paused, Pausing, Resuming};
pub use recharge::{GoingToRecharging, Recharging};
pub use return_home::{
    PausingReturnHome, ResumingReturnHome, ReturnHomePaused, ReturningHome, StoppingReturnHome,
};
pub use stop::{StopContinuation, Stopping};

use crate::machine::context::MachineContext;

/// A named mode of the supervisory controller.
///
/// `step` is called once per polling tick and returns the next state when a
/// handler produced a transition, `None` to keep polling. At most one
/// transition happens per tick.
pub trait State: Send {
    fn name(&self) -> &'static str;

    /// Entry side effect, run before the first `step`.
    fn on_enter(&mut self, _ctx: &mut MachineContext) {}

    /// Exit side effect, run after the winning handler returned and before
    /// the next state's `on_enter`.
    fn on_exit(&mut self, _ctx: &mut MachineContext) {}

    fn step(&mut self, ctx: &mut MachineContext) -> Option<Box<dyn State>>;
}

pub type NextState = Box<dyn State>;

/// Shorthand for returning a transition from a handler.
pub fn go<S: State + 'static>(state: S) -> Option<NextState> {
    Some(Box::new(state))
}
