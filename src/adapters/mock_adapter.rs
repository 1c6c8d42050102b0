//! Scripted command channel for testing
//!
//! This channel simulates an instrument without physical hardware. It provides:
//! - Scripted replies per query string (consumed in order, the last one repeats)
//! - Reactions to sent commands that re-script a query (e.g. a state that changes
//!   after `CALL:...:ACTion CONNect`)
//! - Failure injection
//! - An exchange log for call-count assertions

use super::CommandChannel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One exchange seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// A command written with `send`.
    Send(String),
    /// A command written with `query`.
    Query(String),
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<String>>,
    reactions: HashMap<String, Vec<(String, Vec<String>)>>,
    log: Vec<Exchange>,
    fail_next: bool,
}

impl MockState {
    fn load(&mut self, query: &str, replies: &[String]) {
        self.replies
            .insert(query.to_string(), replies.iter().cloned().collect());
    }
}

/// Scripted mock channel
///
/// # Example
///
/// ```
/// use rat_bench::adapters::{CommandChannel, MockChannel};
///
/// # tokio_test::block_on(async {
/// let channel = MockChannel::rat_tester();
/// channel.script("FETCh:LTE:SIGN:PSWitched:STATe?", &["ON", "ATT"]);
/// assert_eq!(channel.query("FETCh:LTE:SIGN:PSWitched:STATe?").await.unwrap(), "ON");
/// assert_eq!(channel.query("FETCh:LTE:SIGN:PSWitched:STATe?").await.unwrap(), "ATT");
/// assert_eq!(channel.query("FETCh:LTE:SIGN:PSWitched:STATe?").await.unwrap(), "ATT");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    /// Create a mock with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock radio tester: `*OPC?` always answers `1`.
    pub fn rat_tester() -> Self {
        let channel = Self::new();
        channel.script("*OPC?", &["1"]);
        channel
    }

    /// Mock DC source: `*OPC?` always answers `+1`.
    pub fn dc_source() -> Self {
        let channel = Self::new();
        channel.script("*OPC?", &["+1"]);
        channel
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Script the replies for `query`, replacing any previous script.
    ///
    /// Replies are returned in order; the last one repeats forever.
    pub fn script(&self, query: &str, replies: &[&str]) {
        let replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
        self.lock().load(query, &replies);
    }

    /// When `command` is sent, re-script `query` with `replies`.
    pub fn on_send(&self, command: &str, query: &str, replies: &[&str]) {
        let replies = replies.iter().map(|r| r.to_string()).collect();
        self.lock()
            .reactions
            .entry(command.to_string())
            .or_default()
            .push((query.to_string(), replies));
    }

    /// Inject a transport failure for the next exchange.
    pub fn inject_next_failure(&self) {
        self.lock().fail_next = true;
    }

    /// Every exchange seen so far, in order.
    pub fn log(&self) -> Vec<Exchange> {
        self.lock().log.clone()
    }

    /// Every command written with `send`, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter_map(|e| match e {
                Exchange::Send(cmd) => Some(cmd.clone()),
                Exchange::Query(_) => None,
            })
            .collect()
    }

    /// Number of times `command` was sent.
    pub fn send_count(&self, command: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|e| matches!(e, Exchange::Send(c) if c == command))
            .count()
    }

    /// Number of times `query` was issued.
    pub fn query_count(&self, query: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|e| matches!(e, Exchange::Query(q) if q == query))
            .count()
    }

    /// Clear the exchange log, keeping scripts.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn send(&self, command: &str) -> Result<()> {
        let mut state = self.lock();
        state.log.push(Exchange::Send(command.to_string()));
        if std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Injected failure sending '{}'", command));
        }
        if let Some(reactions) = state.reactions.get(command).cloned() {
            for (query, replies) in reactions {
                state.load(&query, &replies);
            }
        }
        Ok(())
    }

    async fn query(&self, command: &str) -> Result<String> {
        let mut state = self.lock();
        state.log.push(Exchange::Query(command.to_string()));
        if std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Injected failure querying '{}'", command));
        }
        let queue = state
            .replies
            .get_mut(command)
            .ok_or_else(|| anyhow!("No scripted reply for '{}'", command))?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.ok_or_else(|| anyhow!("Empty script for '{}'", command))
    }

    fn describe(&self) -> String {
        "MockChannel".to_string()
    }
}
