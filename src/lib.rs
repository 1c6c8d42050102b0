//! Core library for the RAT bench.
//!
//! Drives a radio communication tester and a DC source to characterize the
//! transmit power and current draw of a GSM/WCDMA/LTE device. The layers are:
//!
//! - [`adapters`]: request/response command channels (VISA, mock)
//! - [`sync`]: completion gates and state polling on top of a channel
//! - [`rat`]: per-technology controllers and the instrument code tables
//! - [`session`], [`dc_source`]: the two instruments
//! - [`stability`], [`records`], [`runner`]: the measurement procedure and its output

pub mod adapters;
pub mod config;
pub mod dc_source;
pub mod error;
pub mod logging;
pub mod rat;
pub mod records;
pub mod runner;
pub mod session;
pub mod stability;
pub mod sync;
