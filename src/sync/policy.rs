//! Bounded polling.

use crate::adapters::CommandChannel;
use crate::error::{AppResult, BenchError};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Cadence and deadline for instrument polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two polls.
    pub interval: Duration,
    /// Give up after this long. `None` polls until the predicate holds.
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    /// Fixed 100 ms poll cadence used for every instrument state.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    /// Default poll deadline. Long enough for a UE to find the cell and attach.
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

    /// Poll at the default cadence until `deadline` elapses.
    pub fn bounded(deadline: Duration) -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            deadline: Some(deadline),
        }
    }

    /// Poll at the default cadence with no deadline.
    ///
    /// A non-responding instrument stalls the caller indefinitely.
    pub fn unbounded() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            deadline: None,
        }
    }

    /// Override the poll cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::bounded(Self::DEFAULT_DEADLINE)
    }
}

/// Issue `query` until `accept` holds for the reply, and return that reply.
///
/// The first query is issued immediately; later ones follow `policy.interval` apart.
/// A predicate satisfied by the K-th reply costs exactly K queries.
///
/// # Errors
/// - [`BenchError::Transport`] if a query fails
/// - [`BenchError::PollTimeout`] once `policy.deadline` has elapsed without acceptance
pub async fn poll_until<F>(
    channel: &dyn CommandChannel,
    query: &str,
    policy: &PollPolicy,
    mut accept: F,
) -> AppResult<String>
where
    F: FnMut(&str) -> bool,
{
    let start = Instant::now();
    loop {
        let reply = channel.query(query).await?;
        if accept(&reply) {
            return Ok(reply);
        }
        trace!("'{}' -> '{}', polling again", query, reply);

        if let Some(deadline) = policy.deadline {
            let waited = start.elapsed();
            if waited >= deadline {
                return Err(BenchError::PollTimeout {
                    query: query.to_string(),
                    waited,
                    last_reply: Some(reply),
                });
            }
        }
        sleep(policy.interval).await;
    }
}
