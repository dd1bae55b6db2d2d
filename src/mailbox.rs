//! Single-slot, typed, thread-safe handoff channel.
//!
//! Every signal that crosses a thread boundary in the supervisor (commands,
//! acknowledgements, status reports) travels through a `Mailbox`. A mailbox
//! holds at most one pending value: writers overwrite (latest-wins) and never
//! block, readers either poll non-blockingly or await with a timeout.
//!
//! There is no ordering guarantee across distinct mailboxes; only the
//! per-mailbox single-slot relation holds.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Raised when `consume` gives up waiting for a value.
///
/// A distinguished error type rather than a sentinel, so callers can never
/// silently treat "no data" as "falsy data".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timed out waiting on mailbox `{mailbox}` after {waited_ms} ms")]
pub struct MailboxTimeout {
    /// Name of the mailbox the wait was on.
    pub mailbox: &'static str,
    /// How long the caller waited, in milliseconds.
    pub waited_ms: u128,
}

/// Single-slot handoff channel.
pub struct Mailbox<T> {
    name: &'static str,
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox. The name is used in timeout errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Name given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        // A poisoned slot only means a writer panicked mid-store; the Option
        // inside is still structurally sound.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deposit a one-shot value, overwriting any pending one. Never blocks.
    pub fn trigger(&self, value: T) {
        *self.slot() = Some(value);
        self.notify.notify_waiters();
    }

    /// Deposit a continuously-refreshed value (battery level, state name).
    ///
    /// Mechanically identical to [`trigger`](Self::trigger); the distinct
    /// name records that overwrite-without-blocking is the intended
    /// semantics for this value, not a coalesced command.
    pub fn update(&self, value: T) {
        self.trigger(value);
    }

    /// Remove and return the pending value without waiting.
    pub fn try_consume(&self) -> Option<T> {
        self.slot().take()
    }

    /// Remove and return the pending value, waiting up to `timeout`.
    pub async fn consume(&self, timeout: Duration) -> Result<T, MailboxTimeout> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            // Register interest before checking the slot so a trigger between
            // the check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(value) = self.slot().take() {
                return Ok(value);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, notified).await.is_err()
            {
                // Last chance: a value may have landed as the timer fired.
                if let Some(value) = self.slot().take() {
                    return Ok(value);
                }
                return Err(MailboxTimeout {
                    mailbox: self.name,
                    waited_ms: started.elapsed().as_millis(),
                });
            }
        }
    }

    /// Discard any pending value.
    pub fn clear(&self) {
        *self.slot() = None;
    }

    /// Whether a value is pending.
    pub fn has_event(&self) -> bool {
        self.slot().is_some()
    }
}

impl<T: Clone> Mailbox<T> {
    /// Read the pending value without removing it.
    pub fn check(&self) -> Option<T> {
        self.slot().clone()
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.name)
            .field("has_event", &self.has_event())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn trigger_overwrites_pending_value() {
        let mb = Mailbox::new("test");
        mb.trigger(1);
        mb.trigger(2);
        assert_eq!(mb.try_consume(), Some(2));
        assert_eq!(mb.try_consume(), None);
    }

    #[test]
    fn check_peeks_without_removing() {
        let mb = Mailbox::new("test");
        mb.trigger("hello");
        assert_eq!(mb.check(), Some("hello"));
        assert!(mb.has_event());
        assert_eq!(mb.try_consume(), Some("hello"));
        assert!(!mb.has_event());
    }

    #[test]
    fn clear_discards_pending_value() {
        let mb = Mailbox::new("test");
        mb.trigger(42);
        mb.clear();
        assert!(!mb.has_event());
        assert_eq!(mb.try_consume(), None);
    }

    #[tokio::test]
    async fn consume_returns_already_pending_value() {
        let mb = Mailbox::new("test");
        mb.trigger(7);
        let got = mb.consume(Duration::from_millis(10)).await;
        assert_eq!(got, Ok(7));
    }

    #[tokio::test]
    async fn consume_times_out_with_distinguished_error() {
        let mb: Mailbox<i32> = Mailbox::new("empty");
        let err = mb
            .consume(Duration::from_millis(20))
            .await
            .expect_err("should time out");
        assert_eq!(err.mailbox, "empty");
    }

    #[tokio::test]
    async fn consume_wakes_on_late_trigger() {
        let mb = Arc::new(Mailbox::new("late"));
        let writer = Arc::clone(&mb);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.trigger("arrived");
        });
        let got = mb.consume(Duration::from_secs(2)).await;
        assert_eq!(got, Ok("arrived"));
    }

    #[tokio::test]
    async fn update_has_latest_wins_semantics() {
        let mb = Mailbox::new("battery");
        mb.update(55.0_f64);
        mb.update(54.5_f64);
        assert_eq!(mb.check(), Some(54.5));
        // Peeking does not consume a continuously-refreshed value.
        assert_eq!(mb.check(), Some(54.5));
    }
}
