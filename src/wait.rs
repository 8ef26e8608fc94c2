//! Availability polling for freshly restored instances.
//!
//! The poller issues one describe call per tick until the instance reports
//! `available` or a hard wall-clock ceiling passes. Transient describe
//! failures while the instance spins up are expected noise: they are
//! swallowed and consume the tick, they never reset the budget. Because
//! the ceiling is only checked at tick boundaries, the actual overrun can
//! exceed it by up to one tick interval.
//!
//! Timing out is terminal for the run but deliberately does not delete the
//! partially created instance; teardown is the orchestrator's job on every
//! exit path.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;

use crate::control::{ControlPlane, InstanceDescription, InstanceHandle};
use crate::retry::Transience;

/// Errors raised while waiting for an instance to become available.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the ceiling passes without an observed `available`.
    #[error("instance \"{identifier}\" did not become available within {} seconds", waited.as_secs())]
    Timeout {
        /// Instance being waited on.
        identifier: String,
        /// Wall-clock time spent polling.
        waited: Duration,
    },
    /// Raised when a describe call fails in a way retrying cannot heal.
    #[error("failed to describe instance \"{identifier}\": {source}")]
    Describe {
        /// Instance being waited on.
        identifier: String,
        /// Provider error.
        #[source]
        source: E,
    },
}

/// Fixed-tick availability poller with a hard wall-clock ceiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    /// Creates a poller ticking every `interval` with ceiling `timeout`.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Blocks until the instance reports `available` and returns its
    /// description; the description always comes from a successful
    /// describe call, never from an assumption.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Timeout`] when the ceiling passes first, or
    /// [`PollError::Describe`] when a describe call fails with a
    /// non-transient error.
    pub async fn wait_for_available<C: ControlPlane>(
        &self,
        control: &C,
        handle: &InstanceHandle,
    ) -> Result<InstanceDescription, PollError<C::Error>> {
        let started = Instant::now();

        loop {
            match control.describe_instance(handle).await {
                Ok(Some(description)) if description.status.is_available() => {
                    return Ok(description);
                }
                // Unknown-to-the-control-plane and not-yet-available both
                // just wait for the next tick.
                Ok(_) => {}
                Err(err) if err.is_transient() => {}
                Err(source) => {
                    return Err(PollError::Describe {
                        identifier: handle.identifier.clone(),
                        source,
                    });
                }
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(PollError::Timeout {
                    identifier: handle.identifier.clone(),
                    waited,
                });
            }
            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use thiserror::Error;

    use crate::control::{ControlPlaneFuture, InstanceStatus, RestoreRequest};
    use crate::snapshot::Snapshot;

    use super::*;

    #[derive(Clone, Debug, Error, Eq, PartialEq)]
    enum FakeError {
        #[error("transient describe failure")]
        Transient,
        #[error("terminal describe failure")]
        Terminal,
    }

    impl Transience for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    type DescribeResult = Result<Option<InstanceDescription>, FakeError>;

    /// Control plane double replaying a scripted describe sequence. The
    /// final element repeats once the script runs out.
    struct SequencedControlPlane {
        describes: Mutex<VecDeque<DescribeResult>>,
    }

    impl SequencedControlPlane {
        fn new(describes: Vec<DescribeResult>) -> Self {
            Self {
                describes: Mutex::new(describes.into()),
            }
        }

        fn next_describe(&self) -> DescribeResult {
            let mut queue = self.describes.lock().expect("describe queue poisoned");
            if queue.len() > 1 {
                queue.pop_front().expect("queue checked non-empty")
            } else {
                queue.front().cloned().unwrap_or(Ok(None))
            }
        }
    }

    impl ControlPlane for SequencedControlPlane {
        type Error = FakeError;

        fn list_snapshots<'a>(
            &'a self,
            _source_instance: &'a str,
        ) -> ControlPlaneFuture<'a, Vec<Snapshot>, Self::Error> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn restore_from_snapshot<'a>(
            &'a self,
            request: &'a RestoreRequest,
        ) -> ControlPlaneFuture<'a, InstanceHandle, Self::Error> {
            Box::pin(async move {
                Ok(InstanceHandle {
                    identifier: request.identifier.clone(),
                })
            })
        }

        fn describe_instance<'a>(
            &'a self,
            _handle: &'a InstanceHandle,
        ) -> ControlPlaneFuture<'a, Option<InstanceDescription>, Self::Error> {
            Box::pin(async { self.next_describe() })
        }

        fn delete_instance<'a>(
            &'a self,
            _handle: &'a InstanceHandle,
        ) -> ControlPlaneFuture<'a, (), Self::Error> {
            Box::pin(async { Ok(()) })
        }
    }

    fn description(status: InstanceStatus) -> InstanceDescription {
        InstanceDescription {
            status,
            engine: "postgres".to_owned(),
            endpoint: None,
            master_username: Some("master".to_owned()),
            default_database: Some("appdb".to_owned()),
        }
    }

    fn handle() -> InstanceHandle {
        InstanceHandle {
            identifier: "dump-abcdefgh-snap".to_owned(),
        }
    }

    fn fast_poller() -> Poller {
        Poller::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn returns_description_once_available_is_observed() {
        let control = SequencedControlPlane::new(vec![
            Ok(None),
            Ok(Some(description(InstanceStatus::Creating))),
            Err(FakeError::Transient),
            Ok(Some(description(InstanceStatus::Available))),
        ]);

        let described = fast_poller()
            .wait_for_available(&control, &handle())
            .await
            .expect("instance becomes available");
        assert!(described.status.is_available());
    }

    #[tokio::test]
    async fn transient_describe_errors_do_not_reset_the_budget() {
        let control = SequencedControlPlane::new(vec![Err(FakeError::Transient)]);

        let started = Instant::now();
        let err = fast_poller()
            .wait_for_available(&control, &handle())
            .await
            .expect_err("never becomes available");

        assert!(matches!(err, PollError::Timeout { .. }));
        // Overrun stays within one tick of the ceiling (plus scheduling
        // slack).
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn never_available_times_out_with_the_waited_duration() {
        let control =
            SequencedControlPlane::new(vec![Ok(Some(description(InstanceStatus::Creating)))]);

        let err = fast_poller()
            .wait_for_available(&control, &handle())
            .await
            .expect_err("stuck in creating");
        match err {
            PollError::Timeout { identifier, waited } => {
                assert_eq!(identifier, "dump-abcdefgh-snap");
                assert!(waited >= Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_describe_error_propagates_immediately() {
        let control = SequencedControlPlane::new(vec![Err(FakeError::Terminal)]);

        let err = fast_poller()
            .wait_for_available(&control, &handle())
            .await
            .expect_err("terminal error");
        assert!(matches!(
            err,
            PollError::Describe {
                source: FakeError::Terminal,
                ..
            }
        ));
    }
}
