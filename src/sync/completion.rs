//! Operation-complete confirmation for mutating commands.

use super::policy::{poll_until, PollPolicy};
use crate::adapters::CommandChannel;
use crate::error::AppResult;
use std::sync::Arc;
use tracing::debug;

/// Operation-complete query understood by both instruments.
pub const OPC_QUERY: &str = "*OPC?";

/// Success token the radio tester returns once a command is applied.
pub const RAT_TESTER_TOKEN: &str = "1";

/// Success token the DC source returns once a command is applied.
pub const DC_SOURCE_TOKEN: &str = "+1";

/// "Configuration applied" semantics over a [`CommandChannel`].
///
/// After a mutating command is sent, `*OPC?` is polled until its trimmed reply is
/// exactly the instrument's success token. No dependent command is issued before
/// that happens.
#[derive(Clone)]
pub struct CompletionGate {
    channel: Arc<dyn CommandChannel>,
    success_token: &'static str,
    policy: PollPolicy,
}

impl CompletionGate {
    /// Create a gate expecting `success_token` from `*OPC?`.
    pub fn new(channel: Arc<dyn CommandChannel>, success_token: &'static str, policy: PollPolicy) -> Self {
        Self {
            channel,
            success_token,
            policy,
        }
    }

    /// Gate for the radio tester (`"1"`).
    pub fn rat_tester(channel: Arc<dyn CommandChannel>, policy: PollPolicy) -> Self {
        Self::new(channel, RAT_TESTER_TOKEN, policy)
    }

    /// Gate for the DC source (`"+1"`).
    pub fn dc_source(channel: Arc<dyn CommandChannel>, policy: PollPolicy) -> Self {
        Self::new(channel, DC_SOURCE_TOKEN, policy)
    }

    /// Send `command` and return once the instrument confirms it was applied.
    pub async fn confirm_after(&self, command: &str) -> AppResult<()> {
        self.send(command).await?;
        self.confirm().await
    }

    /// Poll `*OPC?` until the success token is returned.
    pub async fn confirm(&self) -> AppResult<()> {
        let token = self.success_token;
        poll_until(self.channel.as_ref(), OPC_QUERY, &self.policy, |reply| {
            reply.trim() == token
        })
        .await?;
        Ok(())
    }

    /// Send a command without waiting for completion.
    pub async fn send(&self, command: &str) -> AppResult<()> {
        debug!("-> {}", command);
        self.channel.send(command).await?;
        Ok(())
    }

    /// Issue a query and return the reply as-is.
    pub async fn query(&self, query: &str) -> AppResult<String> {
        let reply = self.channel.query(query).await?;
        debug!("{} -> {}", query, reply);
        Ok(reply)
    }

    /// Shared channel this gate talks to.
    pub fn channel(&self) -> &Arc<dyn CommandChannel> {
        &self.channel
    }

    /// Poll policy applied to confirmations.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_adapter::Exchange;
    use crate::adapters::MockChannel;
    use crate::error::BenchError;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_token_on_nth_query_costs_n_polls() {
        let mock = MockChannel::new();
        mock.script(OPC_QUERY, &["0", "0", "0", "1"]);
        let gate = CompletionGate::rat_tester(Arc::new(mock.clone()), PollPolicy::unbounded());

        gate.confirm_after("CONFigure:LTE:SIGN:BAND OB3").await.unwrap();

        assert_eq!(mock.query_count(OPC_QUERY), 4);
        assert_eq!(
            mock.log().first(),
            Some(&Exchange::Send("CONFigure:LTE:SIGN:BAND OB3".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_is_trimmed_before_comparison() {
        let mock = MockChannel::new();
        mock.script(OPC_QUERY, &["+1\n"]);
        let gate = CompletionGate::dc_source(Arc::new(mock.clone()), PollPolicy::unbounded());

        gate.confirm().await.unwrap();
        assert_eq!(mock.query_count(OPC_QUERY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_must_match_exactly() {
        // "1" is not the DC source's token and "+1" is not the tester's.
        let mock = MockChannel::new();
        mock.script(OPC_QUERY, &["1", "1", "+1"]);
        let gate = CompletionGate::dc_source(Arc::new(mock.clone()), PollPolicy::unbounded());
        gate.confirm().await.unwrap();
        assert_eq!(mock.query_count(OPC_QUERY), 3);

        let mock = MockChannel::new();
        mock.script(OPC_QUERY, &["+1"]);
        let gate = CompletionGate::rat_tester(
            Arc::new(mock.clone()),
            PollPolicy::bounded(Duration::from_millis(500)),
        );
        let err = gate.confirm().await.unwrap_err();
        assert!(matches!(err, BenchError::PollTimeout { .. }));
    }
}
