//! Request-wrapper: one blocking robot call, non-blocking completion polling.
//!
//! A [`RobotRequest`] runs a single blocking driver call on a dedicated
//! blocking worker and exposes "is it done / did it fail" polling to its
//! caller. The state machine and the command issuer never await the call
//! itself; they poll every tick.
//!
//! Cancellation never reaches the worker: no robot vendor API offers
//! cooperative cancellation, so an in-flight call is allowed to finish or
//! fail on its own even when the supervisor is shutting down.

use tokio::task::JoinHandle;

use crate::error::ErrorMessage;

/// A single in-flight blocking robot call.
pub struct RobotRequest<T> {
    handle: Option<JoinHandle<Result<T, ErrorMessage>>>,
}

impl<T: Send + 'static> RobotRequest<T> {
    /// Start the blocking call on a blocking-capable worker.
    pub fn spawn<F>(call: F) -> Self
    where
        F: FnOnce() -> Result<T, ErrorMessage> + Send + 'static,
    {
        Self {
            handle: Some(tokio::task::spawn_blocking(call)),
        }
    }

    /// Whether the call has completed (successfully or not). Never blocks.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Collect the outcome if the worker has finished; `None` while it is
    /// still running or after the outcome was already collected.
    pub async fn try_result(&mut self) -> Option<Result<T, ErrorMessage>> {
        if !self.is_finished() {
            return None;
        }
        let handle = self.handle.take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => Some(Err(ErrorMessage::unknown(format!(
                "robot call worker failed: {e}"
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completed_call_yields_its_result() {
        let mut request = RobotRequest::spawn(|| Ok(41 + 1));
        // Wait for the worker without awaiting the call directly.
        while !request.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(request.try_result().await, Some(Ok(42)));
        // Outcome can only be collected once.
        assert_eq!(request.try_result().await, None);
    }

    #[tokio::test]
    async fn in_flight_call_reports_not_finished() {
        let mut request: RobotRequest<()> = RobotRequest::spawn(|| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });
        assert_eq!(request.try_result().await, None);
        assert!(!request.is_finished());
    }

    #[tokio::test]
    async fn failure_is_reported_as_error_message() {
        let mut request: RobotRequest<()> =
            RobotRequest::spawn(|| Err(ErrorMessage::action_failure("arm jammed")));
        while !request.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let outcome = request.try_result().await.expect("finished");
        assert_eq!(
            outcome.unwrap_err().reason,
            crate::error::ErrorReason::ActionFailure
        );
    }
}
