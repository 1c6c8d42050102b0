//! Radio tester session.
//!
//! Owns the tester channel, the signal route and the poll policy, and hands all
//! three to the RAT controllers it creates.

use crate::adapters::{CommandChannel, VisaChannel};
use crate::config::CorrectionTable;
use crate::error::{AppResult, BenchError};
use crate::rat::{GsmController, LteController, SignalRoute, WcdmaController};
use crate::sync::{CompletionGate, PollPolicy};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the frequency correction table created by [`InstrumentSession::set_correction_table`].
pub const CORRECTION_TABLE_NAME: &str = "'custom'";

/// Remote trace file on the tester, below its log folder.
pub fn trace_file_name(at: DateTime<Local>) -> String {
    format!("@LOG\\{}\\conduction.xml", at.format("%Y%m%d_%H%M%S"))
}

/// Session with the radio communication tester.
pub struct InstrumentSession {
    channel: Arc<dyn CommandChannel>,
    gate: CompletionGate,
    policy: PollPolicy,
    route: Option<SignalRoute>,
}

impl InstrumentSession {
    /// Open `resource` over VISA.
    pub async fn connect(resource: &str, timeout: Duration, policy: PollPolicy) -> AppResult<Self> {
        let channel = VisaChannel::connect(resource, timeout).await?;
        info!("Connected to radio tester: {}", channel.describe());
        Ok(Self::new(Arc::new(channel), policy))
    }

    /// Wrap an already open channel.
    pub fn new(channel: Arc<dyn CommandChannel>, policy: PollPolicy) -> Self {
        Self {
            gate: CompletionGate::rat_tester(channel.clone(), policy),
            channel,
            policy,
            route: None,
        }
    }

    /// Shared channel.
    pub fn channel(&self) -> &Arc<dyn CommandChannel> {
        &self.channel
    }

    /// Poll policy handed to every controller.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Route set by [`set_signal_routing`](Self::set_signal_routing), if any.
    pub fn route(&self) -> Option<&SignalRoute> {
        self.route.as_ref()
    }

    /// Reset the tester to its defaults.
    pub async fn reset(&self) -> AppResult<()> {
        self.gate.confirm_after("*RST").await
    }

    /// Mirror the remote command stream to the tester display and a trace file.
    pub async fn start_trace(&self) -> AppResult<()> {
        self.gate.send("SYSTEM:DISPlay:UPDate OFF").await?;
        self.gate.send("TRACe:REMote:MODE:DISPlay:CLEar").await?;
        self.gate.send("TRACe:REMote:MODE:DISPlay:ENABle LIVE").await?;
        let file = trace_file_name(Local::now());
        self.gate
            .send(&format!("TRACe:REMote:MODE:FILE1:NAME \"{}\"", file))
            .await?;
        self.gate.send("TRACe:REMote:MODE:FILE1:ENABle ON").await?;
        info!("Remote trace started: {}", file);
        Ok(())
    }

    /// Stop writing the trace file.
    pub async fn stop_trace(&self) -> AppResult<()> {
        self.gate.send("TRACe:REMote:MODE:FILE1:ENABle OFF").await
    }

    /// Set the RF path used by every controller created afterwards.
    pub async fn set_signal_routing(&mut self, route: SignalRoute) -> AppResult<()> {
        self.gate
            .send(&format!(
                "ROUTe:LTE:SIGN:SCENario:SCELl {}",
                route.scenario_args()
            ))
            .await?;
        info!(
            "Signal routing: RF{}COM, converter {}",
            route.connector, route.converter
        );
        self.route = Some(route);
        Ok(())
    }

    fn require_route(&self) -> AppResult<SignalRoute> {
        self.route.clone().ok_or(BenchError::RouteNotSet)
    }

    /// Create and activate a two-point frequency correction table on the route.
    pub async fn set_correction_table(&self, table: &CorrectionTable) -> AppResult<()> {
        let route = self.require_route()?;
        self.gate
            .confirm_after(&format!(
                "CONFigure:BASE:FDCorrection:CTABle:CREate {}, {}MHz, {}, {}MHz, {}",
                CORRECTION_TABLE_NAME,
                table.low_frequency_mhz,
                table.low_correction_db,
                table.high_frequency_mhz,
                table.high_correction_db
            ))
            .await?;
        let details = self
            .gate
            .query(&format!(
                "CONFigure:BASE:FDCorrection:CTABle:DETails? {}",
                CORRECTION_TABLE_NAME
            ))
            .await?;
        debug!("Correction table details: {}", details.trim());
        info!("Created correction table");

        self.gate
            .confirm_after(&format!(
                "CONFigure:FDCorrection:ACTivate RF{}C, {}, RXTX, RF{}",
                route.connector, CORRECTION_TABLE_NAME, route.converter
            ))
            .await?;
        let usage = self
            .gate
            .query(&format!(
                "CONFigure:FDCorrection:USAGe? RF{}C,RF{}",
                route.connector, route.converter
            ))
            .await?;
        debug!("Correction table usage: {}", usage.trim());
        Ok(())
    }

    /// GSM controller on the session's route.
    pub async fn gsm(&self) -> AppResult<GsmController> {
        GsmController::new(self.channel.clone(), self.require_route()?, self.policy).await
    }

    /// WCDMA controller on the session's route.
    pub async fn wcdma(&self) -> AppResult<WcdmaController> {
        WcdmaController::new(self.channel.clone(), self.require_route()?, self.policy).await
    }

    /// LTE controller on the session's route.
    pub async fn lte(&self) -> AppResult<LteController> {
        LteController::new(self.channel.clone(), self.require_route()?, self.policy).await
    }
}
