//! Instrument state synchronization
//!
//! The two primitives every RAT controller is built from:
//!
//! - [`CompletionGate`]: send a mutating command, then poll `*OPC?` until the
//!   instrument reports the configuration as applied.
//! - [`StateWatcher`]: poll a state query until a [`StatePredicate`] accepts the reply,
//!   either unconditionally or guarded by an "already there" pre-check.
//!
//! Both poll on the cadence and deadline of a shared [`PollPolicy`].

pub mod completion;
pub mod policy;
pub mod watcher;

pub use completion::{CompletionGate, DC_SOURCE_TOKEN, OPC_QUERY, RAT_TESTER_TOKEN};
pub use policy::{poll_until, PollPolicy};
pub use watcher::{StatePredicate, StateWatcher, Transition};
