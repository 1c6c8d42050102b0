//! LTE FDD controller (packet-switched)

use super::codes::{LteBandwidth, PagingCycle};
use super::link::{RatLink, RatVocabulary};
use super::reply::LTE_MODULATION_AVERAGE;
use super::{operating_band, strip_operating_band};
use super::{ChannelConfig, RatController, SignalRoute, Technology};
use crate::adapters::CommandChannel;
use crate::error::{AppResult, BenchError};
use crate::sync::{PollPolicy, StatePredicate, Transition};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// LTE command vocabulary.
pub static LTE_VOCABULARY: RatVocabulary = RatVocabulary {
    technology: Technology::Lte,
    route: "ROUTe:LTE:SIGN:SCENario:SCELl",
    cell_state: "SOURce:LTE:SIGN:CELL:STATe",
    connection_state: "FETCH:LTE:SIGN:PSWitched:STATe?",
    connect_action: "CALL:LTE:SIGN:PSWitched:ACTion CONNect",
    measurement_start: "INIT:LTE:MEAS:MEValuation",
    measurement_state: "FETCh:LTE:MEAS:MEValuation:STATe:ALL?",
    measurement_result: "FETCh:LTE:MEAS:MEValuation:MODulation:AVERage?",
    measurement_schema: LTE_MODULATION_AVERAGE,
};

const BAND: &str = "CONFigure:LTE:SIGN:BAND";
const DL_CHANNEL: &str = "CONFigure:LTE:SIGN:RFSettings:CHANnel:DL";
const UL_CHANNEL_QUERY: &str = "CONFigure:LTE:SIGN:RFSettings:CHANnel:UL?";
const DL_BANDWIDTH: &str = "CONFigure:LTE:SIGN:CELL:BANDwidth:DL";
const RMC_UL: &str = "CONFigure:LTE:SIGN:CONNection:RMC:UL";
const RMC_RB_POSITION: &str = "CONFigure:LTE:SIGN:CONNection:RMC:RBPosition:UL";
const RSEP_LEVEL: &str = "CONF:LTE:SIGN:DL:RSEP:LEV";

/// Uplink RMC allocation as echoed by the tester.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RmcAllocation {
    /// Number of resource blocks, e.g. `"12"`
    pub rb_count: String,
    /// Resource block position, e.g. `"LOW"`
    pub rb_position: String,
}

/// LTE controller.
pub struct LteController {
    link: RatLink,
    config: ChannelConfig,
    rmc: RmcAllocation,
}

impl LteController {
    /// Bind the route and set up single-shot modulation measurements.
    pub async fn new(
        channel: Arc<dyn CommandChannel>,
        route: SignalRoute,
        policy: PollPolicy,
    ) -> AppResult<Self> {
        let link = RatLink::bind(channel, route, policy, &LTE_VOCABULARY).await?;
        for command in [
            "ROUTe:LTE:MEAS:SCENario:CSPath 'LTE Sig1'",
            "CONFigure:LTE:MEAS:MEValuation:REPetition SING",
            "CONFigure:LTE:MEAS:MEValuation:MODulation:MSCHeme AUTO",
            "CONFigure:LTE:MEAS:MEValuation:RBALlocation:AUTO ON",
            "TRIGger:LTE:MEAS:MEValuation:SOURce 'LTE Sig1: FrameTrigger'",
            "CONFigure:LTE:MEAS:MEValuation:RESult:TXM ON",
        ] {
            link.send(command).await?;
        }
        Ok(Self {
            link,
            config: ChannelConfig::default(),
            rmc: RmcAllocation::default(),
        })
    }

    /// Retained RMC allocation.
    pub fn rmc(&self) -> &RmcAllocation {
        &self.rmc
    }

    /// Configure the uplink reference measurement channel.
    ///
    /// `rb_count` is sent as `N<count>`; the retained count strips that type
    /// character from the echo again.
    pub async fn config_rmc(&mut self, rb_count: &str, rb_position: &str) -> AppResult<&RmcAllocation> {
        self.link
            .apply("CONFigure:LTE:SIGN:CONNection:STYPe RMC")
            .await?;
        self.link
            .send(&format!("{} N{},KEEP,KEEP", RMC_UL, rb_count))
            .await?;
        self.link
            .send(&format!("{} {}", RMC_RB_POSITION, rb_position))
            .await?;

        let position = self.link.read_back(&format!("{}?", RMC_RB_POSITION)).await?;
        let allocation = self.link.read_back(&format!("{}?", RMC_UL)).await?;
        let first = allocation.split(',').next().unwrap_or_default();
        let mut chars = first.chars();
        chars.next();
        self.rmc = RmcAllocation {
            rb_count: chars.as_str().to_string(),
            rb_position: position,
        };
        info!(
            "RB position: {}, RB number: {}",
            self.rmc.rb_position, self.rmc.rb_count
        );
        Ok(&self.rmc)
    }

    /// Set the reference signal energy per resource element (dBm).
    pub async fn set_rsep_level(&self, level: &str) -> AppResult<()> {
        self.link.apply(&format!("{} {}", RSEP_LEVEL, level)).await?;
        let applied = self.link.read_back(&format!("{}?", RSEP_LEVEL)).await?;
        info!("RSEP level: {}", applied);
        Ok(())
    }

    /// Set the open-loop nominal power (dBm).
    pub async fn set_open_loop_power(&self, power: &str) -> AppResult<()> {
        self.link
            .apply(&format!("CONFigure:LTE:SIGN:UL:OLNPower {}", power))
            .await?;
        info!("Set open loop tx power as {}dBm", power);
        Ok(())
    }

    /// Closed-loop PUSCH power control towards `power` dBm.
    pub async fn set_closed_loop_power(&self, power: &str) -> AppResult<()> {
        self.link
            .apply("CONFigure:LTE:SIGN:UL:PUSCh:TPC:SET CLOop")
            .await?;
        self.link
            .apply(&format!("CONFigure:LTE:SIGN:UL:PUSCh:TPC:CLTPower {}", power))
            .await?;
        info!("Set closed loop tx power as {}dBm", power);
        Ok(())
    }

    /// Command maximum PUSCH power, optionally capping the UE with `PMAX` first.
    pub async fn set_max_power(&self, pmax: Option<&str>) -> AppResult<()> {
        if let Some(pmax) = pmax {
            self.link
                .apply(&format!("CONFigure:LTE:SIGN:UL:PMAX {}", pmax))
                .await?;
        }
        self.link
            .apply("CONFigure:LTE:SIGN:UL:PUSCh:TPC:SET MAXPower")
            .await?;
        info!("Set tx power as MAXPower");
        Ok(())
    }

    /// Set the default paging cycle.
    pub async fn set_paging_cycle(&self, cycle: PagingCycle) -> AppResult<()> {
        self.link
            .apply(&format!(
                "CONFigure:LTE:SIGN:CONNection:DPCYcle {}",
                cycle.code()
            ))
            .await?;
        info!("Set paging cycle as {}", cycle.frames());
        Ok(())
    }

    /// Release the RRC connection once the UE has attached (idle-mode measurements).
    pub async fn release_rrc_after_attach(&self) -> AppResult<()> {
        self.link
            .send("CONFigure:LTE:SIGN:CONNection:KRRC OFF")
            .await
    }

    /// Wait until the UE attaches (`ATT`).
    pub async fn attach(&self) -> AppResult<Transition> {
        self.link
            .await_connection_state(&StatePredicate::prefix("ATT"), "ATT")
            .await
    }

    /// Establish the RRC connection unless it already is.
    pub async fn connect_rrc(&self) -> AppResult<Transition> {
        self.link.connect().await
    }

    /// Intra-cell handover onto the retained band, channel and bandwidth.
    pub async fn handover(&self) -> AppResult<()> {
        let bandwidth: LteBandwidth = self
            .config
            .band_width
            .as_deref()
            .ok_or(BenchError::MissingParameter("bandwidth"))?
            .parse()?;
        self.link
            .apply(&format!(
                "PREPare:LTE:SIGN:HAND OB{}, {}, {}, NS01",
                self.config.band,
                self.config.dl_channel,
                bandwidth.code()
            ))
            .await?;
        self.link
            .command_then_connected("CALL:LTE:SIGN:PSWitched:ACTion HANDover")
            .await?;
        info!("Handover completed");
        let applied = self.link.read_back(&format!("{}?", DL_CHANNEL)).await?;
        debug!("DLCH after handover: {}", applied);
        Ok(())
    }
}

#[async_trait]
impl RatController for LteController {
    fn link(&self) -> &RatLink {
        &self.link
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn set_downlink_channel(
        &mut self,
        band: &str,
        dl_channel: &str,
        bandwidth: Option<&str>,
    ) -> AppResult<ChannelConfig> {
        let band = operating_band("LTE band", band)?;
        let bandwidth: LteBandwidth = bandwidth
            .ok_or(BenchError::MissingParameter("bandwidth"))?
            .parse()?;

        self.link.apply(&format!("{} OB{}", BAND, band)).await?;
        self.link
            .apply(&format!("{} {}", DL_CHANNEL, dl_channel))
            .await?;
        self.link
            .apply(&format!("{} {}", DL_BANDWIDTH, bandwidth.code()))
            .await?;

        let band_echo = self.link.read_back(&format!("{}?", BAND)).await?;
        let dl_echo = self.link.read_back(&format!("{}?", DL_CHANNEL)).await?;
        let bw_echo = self.link.read_back(&format!("{}?", DL_BANDWIDTH)).await?;
        let ul_echo = self.link.read_back(UL_CHANNEL_QUERY).await?;
        self.config = ChannelConfig {
            band: strip_operating_band(&band_echo),
            dl_channel: dl_echo,
            ul_channel: Some(ul_echo),
            band_width: Some(
                LteBandwidth::from_code(&bw_echo)
                    .map(|bw| bw.mhz().to_string())
                    .unwrap_or(bw_echo),
            ),
        };
        info!(
            "@BAND: OB{}, DLCH: {}, BW: {}MHz",
            self.config.band,
            self.config.dl_channel,
            self.config.band_width.as_deref().unwrap_or_default()
        );
        debug!("ULCH: {}", self.config.ul_channel.as_deref().unwrap_or_default());
        Ok(self.config.clone())
    }

    async fn establish_connection(&self) -> AppResult<()> {
        self.attach().await?;
        self.connect_rrc().await?;
        Ok(())
    }
}
