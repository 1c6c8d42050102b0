//! RAT controllers
//!
//! One controller per radio access technology, all built from the same
//! [`RatLink`]: signal-route binding, guarded output switching, two-gate connection
//! establishment and single-shot transmit-power measurement. The variants differ only
//! in command vocabulary ([`RatVocabulary`]), reply schema and their extra
//! configuration operations.
//!
//! ## Connection state machine
//!
//! ```text
//! UNKNOWN --query--> ALREADY_TARGET                       (nothing sent)
//!                 \-> NOT_TARGET --action--> POLLING --> TARGET_REACHED
//!                                                   \--> TIMED_OUT (bounded policy only)
//! ```

pub mod codes;
pub mod gsm;
pub mod link;
pub mod lte;
pub mod reply;
pub mod wcdma;

pub use codes::{GsmBand, LteBandwidth, PagingCycle};
pub use gsm::{GsmController, Handover};
pub use link::{RatLink, RatVocabulary};
pub use lte::{LteController, RmcAllocation};
pub use reply::ReplySchema;
pub use wcdma::WcdmaController;

use crate::error::{AppResult, BenchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Radio access technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    /// GSM circuit-switched voice
    #[serde(rename = "GSM")]
    Gsm,
    /// WCDMA circuit-switched voice
    #[serde(rename = "WCDMA")]
    Wcdma,
    /// LTE FDD packet-switched
    #[serde(rename = "LTE_FDD", alias = "LTE")]
    Lte,
}

impl Technology {
    /// Execution order of a test plan.
    pub const RUN_ORDER: [Technology; 3] = [Technology::Gsm, Technology::Wcdma, Technology::Lte];

    /// Short label used in result names.
    pub fn label(self) -> &'static str {
        match self {
            Technology::Gsm => "GSM",
            Technology::Wcdma => "WCDMA",
            Technology::Lte => "LTE",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical RF path: `RF<connector>C` and converter `<converter>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRoute {
    /// Connector number, e.g. `"1"` for RF1COM
    pub connector: String,
    /// Signal converter number, e.g. `"1"` for converter 1
    pub converter: String,
}

impl SignalRoute {
    /// Create a route.
    pub fn new(connector: impl Into<String>, converter: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            converter: converter.into(),
        }
    }

    /// Route arguments for a `ROUTe:<RAT>:SIGN:SCENario:SCELl` command.
    pub fn scenario_args(&self) -> String {
        format!(
            "RF{c}C,RX{v}, RF{c}C,TX{v}",
            c = self.connector,
            v = self.converter
        )
    }
}

/// Downlink configuration as read back from the instrument.
///
/// Every field holds the instrument's echo, never the requested value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Operating band
    pub band: String,
    /// Downlink channel number
    pub dl_channel: String,
    /// Uplink channel number, where the instrument reports it
    pub ul_channel: Option<String>,
    /// Channel bandwidth in MHz (LTE)
    pub band_width: Option<String>,
}

/// Capability set shared by the GSM, WCDMA and LTE controllers.
#[async_trait]
pub trait RatController: Send + Sync {
    /// Shared synchronization body.
    fn link(&self) -> &RatLink;

    /// Retained downlink configuration.
    fn channel_config(&self) -> &ChannelConfig;

    /// Technology this controller drives.
    fn technology(&self) -> Technology {
        self.link().vocabulary().technology
    }

    /// Apply band, channel and (LTE) bandwidth, then retain the instrument's read-back.
    async fn set_downlink_channel(
        &mut self,
        band: &str,
        dl_channel: &str,
        bandwidth: Option<&str>,
    ) -> AppResult<ChannelConfig>;

    /// Drive the UE through both connection gates (camp, then connect).
    async fn establish_connection(&self) -> AppResult<()>;

    /// Switch the cell signal on unless it already is.
    async fn enable_output(&self) -> AppResult<()> {
        self.link().enable_output().await.map(|_| ())
    }

    /// Switch the cell signal off and wait until it is.
    async fn disable_output(&self) -> AppResult<()> {
        self.link().disable_output().await.map(|_| ())
    }

    /// Single-shot average transmit power in dBm, rounded to two decimals.
    async fn measure_average_tx_power(&self) -> AppResult<f64> {
        self.link().measure_average_tx_power().await
    }
}

/// Validate an operating band number (`"1"`, `"20"`) before it is sent as `OB<n>`.
pub(crate) fn operating_band<'a>(kind: &'static str, band: &'a str) -> AppResult<&'a str> {
    let band = band.trim();
    let band = band.strip_prefix("OB").unwrap_or(band);
    if band.is_empty() || !band.chars().all(|c| c.is_ascii_digit()) {
        return Err(BenchError::UnknownCode {
            kind,
            value: band.to_string(),
        });
    }
    Ok(band)
}

/// Strip the instrument's `OB` operating-band prefix from a read-back (`"OB3"` -> `"3"`).
pub(crate) fn strip_operating_band(reply: &str) -> String {
    let reply = reply.trim();
    reply.strip_prefix("OB").unwrap_or(reply).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_arguments() {
        let route = SignalRoute::new("1", "2");
        assert_eq!(route.scenario_args(), "RF1C,RX2, RF1C,TX2");
    }

    #[test]
    fn test_operating_band_validation() {
        assert_eq!(operating_band("LTE band", " 3").unwrap(), "3");
        assert_eq!(operating_band("LTE band", "OB20").unwrap(), "20");
        assert!(matches!(
            operating_band("WCDMA band", "B1"),
            Err(BenchError::UnknownCode { kind: "WCDMA band", .. })
        ));
        assert!(operating_band("WCDMA band", "").is_err());
    }

    #[test]
    fn test_strip_operating_band() {
        assert_eq!(strip_operating_band("OB3"), "3");
        assert_eq!(strip_operating_band("OB20\n"), "20");
        assert_eq!(strip_operating_band("3"), "3");
    }
}
