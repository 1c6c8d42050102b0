//! Poll-until-predicate for instrument state transitions.

use super::policy::{poll_until, PollPolicy};
use crate::adapters::CommandChannel;
use crate::error::AppResult;
use std::sync::Arc;
use tracing::debug;

/// Acceptance test applied to a state reply.
///
/// States are opaque codes such as `ON,ADJ` or `CEST`; they are only ever
/// compared, never decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatePredicate {
    /// Reply starts with any of the listed prefixes.
    PrefixAny(Vec<&'static str>),
    /// Trimmed reply is anything other than the given code.
    NotEqual(&'static str),
}

impl StatePredicate {
    /// Reply starts with `prefix`.
    pub fn prefix(prefix: &'static str) -> Self {
        Self::PrefixAny(vec![prefix])
    }

    /// Reply starts with one of `prefixes`.
    pub fn prefix_any(prefixes: &[&'static str]) -> Self {
        Self::PrefixAny(prefixes.to_vec())
    }

    /// Reply differs from `code`.
    pub fn not_equal(code: &'static str) -> Self {
        Self::NotEqual(code)
    }

    /// Whether `reply` satisfies the predicate.
    pub fn accepts(&self, reply: &str) -> bool {
        match self {
            Self::PrefixAny(prefixes) => prefixes.iter().any(|p| reply.starts_with(p)),
            Self::NotEqual(code) => reply.trim() != *code,
        }
    }
}

/// Outcome of a guarded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The pre-check already matched; nothing was sent.
    AlreadyInTarget(String),
    /// The target state was reached after polling.
    Reached(String),
}

impl Transition {
    /// The accepting state reply.
    pub fn state(&self) -> &str {
        match self {
            Self::AlreadyInTarget(s) | Self::Reached(s) => s,
        }
    }
}

/// Blocking poll primitive for every instrument state transition.
#[derive(Clone)]
pub struct StateWatcher {
    channel: Arc<dyn CommandChannel>,
    policy: PollPolicy,
}

impl StateWatcher {
    /// Create a watcher polling `channel` according to `policy`.
    pub fn new(channel: Arc<dyn CommandChannel>, policy: PollPolicy) -> Self {
        Self { channel, policy }
    }

    /// Poll `query` until `predicate` accepts the reply and return that reply.
    pub async fn await_state(&self, query: &str, predicate: &StatePredicate) -> AppResult<String> {
        self.await_until(query, |reply| predicate.accepts(reply)).await
    }

    /// Poll `query` until `accept` holds and return that reply.
    pub async fn await_until<F>(&self, query: &str, accept: F) -> AppResult<String>
    where
        F: FnMut(&str) -> bool,
    {
        let reply = poll_until(self.channel.as_ref(), query, &self.policy, accept).await?;
        debug!("{} -> {} (accepted)", query, reply);
        Ok(reply)
    }

    /// Guarded action.
    ///
    /// Query once; if `already` accepts the reply nothing is sent. Otherwise send
    /// `action` (when the transition is not passive) and poll until `target` accepts.
    pub async fn ensure_state(
        &self,
        query: &str,
        already: &StatePredicate,
        action: Option<&str>,
        target: &StatePredicate,
    ) -> AppResult<Transition> {
        let current = self.channel.query(query).await?;
        if already.accepts(&current) {
            debug!("{} -> {} (already in target)", query, current);
            return Ok(Transition::AlreadyInTarget(current));
        }
        if let Some(action) = action {
            debug!("-> {}", action);
            self.channel.send(action).await?;
        }
        let reached = self.await_state(query, target).await?;
        Ok(Transition::Reached(reached))
    }

    /// Unconditional wait: always send `command`, then poll `query` until `target` accepts.
    pub async fn command_then_await(
        &self,
        command: &str,
        query: &str,
        target: &StatePredicate,
    ) -> AppResult<String> {
        debug!("-> {}", command);
        self.channel.send(command).await?;
        self.await_state(query, target).await
    }
}
