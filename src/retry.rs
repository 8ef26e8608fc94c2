//! Bounded retry with a fixed backoff delay.
//!
//! Every control-plane call and every dump invocation passes through
//! [`RetryPolicy::run`]; it is the only retry mechanism in the crate.
//! Errors opt into retrying through the [`Transience`] trait, so an
//! "already exists" restore response or a missing dump binary propagates
//! immediately while connection hiccups and nonzero dump exits burn
//! through the attempt budget.

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

/// Classifies an error as worth retrying or terminal.
pub trait Transience {
    /// Returns `true` when another attempt may plausibly succeed.
    fn is_transient(&self) -> bool;
}

/// A bounded attempt budget with a fixed delay between attempts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy performing at most `attempts` total invocations,
    /// sleeping `delay` between them. An attempt budget of zero is treated
    /// as one: the operation always runs at least once.
    #[must_use]
    pub const fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            delay,
        }
    }

    /// Returns the total number of invocations this policy permits.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Invokes `operation` until it succeeds, fails with a non-transient
    /// error, or the attempt budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the operation's last error once no further attempt is made.
    pub async fn run<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transience,
    {
        let backoff = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts.saturating_sub(1));
        operation
            .retry(backoff)
            .when(|err| err.is_transient())
            .await
    }
}
