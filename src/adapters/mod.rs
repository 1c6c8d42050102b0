//! Instrument command channels
//!
//! This module contains the [`CommandChannel`] trait and its implementations,
//! providing the request/response transport the synchronization layer is built on.
//!
//! A channel is shared by reference (`Arc<dyn CommandChannel>`) between the session
//! façade and every RAT controller created from it. Commands are issued from a single
//! call stack, one awaited exchange at a time, so serialization is structural.

pub mod mock_adapter;
pub mod visa_adapter;

pub use mock_adapter::MockChannel;
pub use visa_adapter::VisaChannel;

use anyhow::Result;
use async_trait::async_trait;

/// Request/response transport to a single instrument.
///
/// ## Behavior
/// - `send` writes a fully formed command; no reply is read.
/// - `query` writes a command and returns the reply with its line terminator stripped.
/// - Both apply the adapter's fixed response timeout; reconnection is out of scope.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Send a command without expecting a response (e.g. `*RST`).
    async fn send(&self, command: &str) -> Result<()>;

    /// Send a command and read its response (e.g. `*OPC?`).
    async fn query(&self, command: &str) -> Result<String>;

    /// Short description used in log lines.
    fn describe(&self) -> String;
}
