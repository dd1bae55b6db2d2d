//! The supervisory state machine.
//!
//! One tokio task owns the machine: it polls the current state once per
//! `step_interval`, runs the transition protocol (`on_exit`, swap,
//! `on_enter`) when a state returns a successor, and publishes the current
//! state name for the command surface. States never run concurrently; a
//! transition is atomic from the rest of the system's point of view.

pub mod context;
pub mod states;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::events::Events;
use crate::machine::context::MachineContext;
use crate::machine::states::{Lockdown, Maintenance, State, UnknownStatus};
use crate::mode_store::{ModeStore, OperatingMode};
use crate::telemetry::TelemetryPublisher;

/// Bounded log of recent state names, newest last. Diagnostics only.
pub type TransitionHistory = Arc<Mutex<VecDeque<&'static str>>>;

pub struct StateMachine {
    ctx: MachineContext,
    current: Box<dyn State>,
    history: TransitionHistory,
    cancel: CancellationToken,
}

impl StateMachine {
    /// Build the machine. The initial state comes from the persisted
    /// operating mode: a robot left in maintenance or lockdown resumes
    /// there, everything else starts from `UnknownStatus`.
    pub fn new(
        config: Config,
        events: Arc<Events>,
        telemetry: TelemetryPublisher,
        cancel: CancellationToken,
    ) -> Self {
        let mode_store = ModeStore::new(config.mode_file.clone());
        let current: Box<dyn State> = match mode_store.read() {
            OperatingMode::Maintenance => Box::new(Maintenance::new()),
            OperatingMode::Lockdown => Box::new(Lockdown::new()),
            OperatingMode::Normal => Box::new(UnknownStatus::new()),
        };
        let history_capacity = config.history_capacity;
        let ctx = MachineContext::new(config, events, telemetry, mode_store);
        Self {
            ctx,
            current,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(history_capacity))),
            cancel,
        }
    }

    /// Shared handle to the transition history.
    pub fn history(&self) -> TransitionHistory {
        Arc::clone(&self.history)
    }

    pub fn current_state_name(&self) -> &'static str {
        self.current.name()
    }

    fn record(&self, name: &'static str) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if history.len() == self.ctx.config.history_capacity {
            history.pop_front();
        }
        history.push_back(name);
    }

    fn enter(&mut self, name: &'static str) {
        self.record(name);
        self.ctx.events.current_state.update(name);
        self.ctx.telemetry.publish_state(name);
        self.current.on_enter(&mut self.ctx);
    }

    /// One polling tick: step the current state and apply the transition
    /// protocol if it produced a successor.
    pub fn run_once(&mut self) {
        if let Some(mut next) = self.current.step(&mut self.ctx) {
            self.current.on_exit(&mut self.ctx);
            info!(from = self.current.name(), to = next.name(), "State transition");
            std::mem::swap(&mut self.current, &mut next);
            self.enter(self.current.name());
        }
    }

    /// Run until the cancellation token fires. Consumes the machine; use
    /// `history()` before starting if the history is needed afterwards.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.enter(self.current.name());
            let mut ticker = tokio::time::interval(self.ctx.config.step_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("State machine stopping");
                        return;
                    }
                    _ = ticker.tick() => self.run_once(),
                }
            }
        })
    }
}
