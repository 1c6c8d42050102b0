//! GSM controller (circuit-switched voice)

use super::codes::GsmBand;
use super::link::{RatLink, RatVocabulary};
use super::reply::GSM_POWER_VS_TIME;
use super::{ChannelConfig, RatController, SignalRoute, Technology};
use crate::adapters::CommandChannel;
use crate::error::AppResult;
use crate::sync::{PollPolicy, StatePredicate, Transition};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// GSM command vocabulary.
pub static GSM_VOCABULARY: RatVocabulary = RatVocabulary {
    technology: Technology::Gsm,
    route: "ROUTe:GSM:SIGN:SCENario:SCELl",
    cell_state: "SOURce:GSM:SIGN:CELL:STATe",
    connection_state: "FETCh:GSM:SIGN:CSWitched:STATe?",
    connect_action: "CALL:GSM:SIGN:CSWitched:ACTion CONNect",
    measurement_start: "INIT:GSM:MEAS:MEValuation",
    measurement_state: "FETCh:GSM:MEAS:MEValuation:STATe:ALL?",
    measurement_result: "FETCh:GSM:MEAS:MEValuation:PVTime?",
    measurement_schema: GSM_POWER_VS_TIME,
};

/// Grace period after rewriting the band indicator.
///
/// The tester acknowledges `*OPC?` before the new indicator is broadcast; the UE only
/// follows a handover into DCS/PCS once it has seen it.
pub const BAND_INDICATOR_SETTLE: Duration = Duration::from_secs(5);

/// Timeslot used for the traffic channel after a handover.
pub const HANDOVER_TIMESLOT: u8 = 3;

/// TCH level (dBm) applied on the handover target.
pub const HANDOVER_TCH_LEVEL: &str = "-80";

const BCCH_BAND: &str = "CONFigure:GSM:SIGN:BAND:BCCH";
const BCCH_CHANNEL: &str = "CONFigure:GSM:SIGN:RFSettings:CHANnel:BCCH";
const TCH_BAND_QUERY: &str = "SENSe:GSM:SIGN:BAND:TCH?";
const TCH_CHANNEL: &str = "CONFigure:GSM:SIGN:RFSettings:CHANnel:TCH";
const BCCH_LEVEL: &str = "CONFigure:GSM:SIGN:RFSettings:LEVel:BCCH";
const TCH_LEVEL: &str = "CONFigure:GSM:SIGN:RFSettings:LEVel:TCH";
const BAND_INDICATOR: &str = "CONFigure:GSM:SIGN:CELL:BINDicator";

/// What a [`GsmController::handover`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handover {
    /// The call was handed over to another band.
    Band,
    /// Same band, the traffic channel was rewritten.
    Channel,
    /// Already on the requested band and channel.
    None,
}

/// GSM controller.
///
/// The downlink configuration is the BCCH carrier; the traffic channel is retained
/// separately since a handover moves it independently of the BCCH.
pub struct GsmController {
    link: RatLink,
    bcch: ChannelConfig,
    tch: ChannelConfig,
}

impl GsmController {
    /// Bind the route, switch off the PS domain and set up single-shot measurements.
    pub async fn new(
        channel: Arc<dyn CommandChannel>,
        route: SignalRoute,
        policy: PollPolicy,
    ) -> AppResult<Self> {
        let link = RatLink::bind(channel, route, policy, &GSM_VOCABULARY).await?;
        link.send("CONFigure:GSM:SIGN:CELL:PSDomain OFF").await?;
        link.send("ROUTe:GSM:MEAS:SCENario:CSPath 'GSM Sig1'").await?;
        link.send("CONFigure:GSM:MEAS:MEValuation:REPetition SINGleshot")
            .await?;
        Ok(Self {
            link,
            bcch: ChannelConfig::default(),
            tch: ChannelConfig::default(),
        })
    }

    /// Retained BCCH configuration.
    pub fn bcch(&self) -> &ChannelConfig {
        &self.bcch
    }

    /// Retained TCH configuration.
    pub fn tch(&self) -> &ChannelConfig {
        &self.tch
    }

    /// Map a band symbol echo to its name, keeping unknown echoes verbatim.
    fn band_name(echo: String) -> String {
        GsmBand::from_symbol(&echo)
            .map(|band| band.name().to_string())
            .unwrap_or(echo)
    }

    /// Set the BCCH band and channel, retaining the read-back.
    pub async fn set_bcch_downlink_channel(
        &mut self,
        band: GsmBand,
        dl_channel: &str,
    ) -> AppResult<&ChannelConfig> {
        self.link
            .apply(&format!("{} {}", BCCH_BAND, band.symbol()))
            .await?;
        self.link
            .apply(&format!("{} {}", BCCH_CHANNEL, dl_channel))
            .await?;

        let echo = self.link.read_back(&format!("{}?", BCCH_BAND)).await?;
        self.bcch = ChannelConfig {
            band: Self::band_name(echo),
            dl_channel: self.link.read_back(&format!("{}?", BCCH_CHANNEL)).await?,
            ..ChannelConfig::default()
        };
        info!(
            "Set BCCH --- @BAND: {}, DLCH: {}",
            self.bcch.band, self.bcch.dl_channel
        );
        Ok(&self.bcch)
    }

    async fn refresh_tch(&mut self) -> AppResult<()> {
        let echo = self.link.read_back(TCH_BAND_QUERY).await?;
        self.tch = ChannelConfig {
            band: Self::band_name(echo),
            dl_channel: self.link.read_back(&format!("{}?", TCH_CHANNEL)).await?,
            ..ChannelConfig::default()
        };
        Ok(())
    }

    /// Set the TCH channel, retaining the read-back.
    pub async fn set_tch_downlink_channel(&mut self, dl_channel: &str) -> AppResult<&ChannelConfig> {
        self.link
            .apply(&format!("{} {}", TCH_CHANNEL, dl_channel))
            .await?;
        self.refresh_tch().await?;
        info!(
            "Set TCH --- @BAND: {}, DLCH: {}",
            self.tch.band, self.tch.dl_channel
        );
        Ok(&self.tch)
    }

    /// Set the BCCH level in dBm.
    pub async fn set_bcch_level(&self, level: &str) -> AppResult<()> {
        self.link.apply(&format!("{} {}", BCCH_LEVEL, level)).await?;
        let applied = self.link.read_back(&format!("{}?", BCCH_LEVEL)).await?;
        info!("Set BCCH level: {}", applied);
        Ok(())
    }

    /// Set the TCH level in dBm.
    pub async fn set_tch_level(&self, level: &str) -> AppResult<()> {
        self.link.apply(&format!("{} {}", TCH_LEVEL, level)).await?;
        let applied = self.link.read_back(&format!("{}?", TCH_LEVEL)).await?;
        info!("Set TCH level: {}", applied);
        Ok(())
    }

    /// Set the circuit-switched TCH power control level.
    pub async fn set_tch_pcl(&self, pcl: &str) -> AppResult<()> {
        self.link
            .apply(&format!(
                "CONFigure:GSM:SIGN:RFSettings:PCL:TCH:CSWitched {}",
                pcl
            ))
            .await?;
        info!("Set TCH PCL as {}", pcl);
        Ok(())
    }

    /// Switch discontinuous transmission off.
    pub async fn disable_dtx(&self) -> AppResult<()> {
        self.link.send("CONFigure:GSM:SIGN:DTX OFF").await
    }

    /// Set the number of multiframes between paging blocks (BS-PA-MFRMS).
    pub async fn set_bspamfrms(&self, frames: u8) -> AppResult<()> {
        self.link
            .send(&format!("CONFigure:GSM:SIGN:CELL:BSPamfrms {}", frames))
            .await
    }

    /// Broadcast the band indicator `band` needs, if any and if not already set.
    ///
    /// Returns whether the indicator was rewritten.
    pub async fn set_band_indicator(&self, band: GsmBand) -> AppResult<bool> {
        let Some(indicator) = band.band_indicator() else {
            return Ok(false);
        };
        let current = self.link.read_back(&format!("{}?", BAND_INDICATOR)).await?;
        if current == indicator {
            return Ok(false);
        }
        self.link
            .send(&format!("{} {}", BAND_INDICATOR, indicator))
            .await?;
        debug!(
            "Band indicator {} -> {}, settling {:?}",
            current, indicator, BAND_INDICATOR_SETTLE
        );
        tokio::time::sleep(BAND_INDICATOR_SETTLE).await;
        self.link.gate().confirm().await?;
        Ok(true)
    }

    /// Wait until the UE is synchronized (`SYNC`); an established call also counts.
    pub async fn synchronize(&self) -> AppResult<Transition> {
        self.link
            .await_connection_state(&StatePredicate::prefix_any(&["SYNC", "CEST"]), "SYNC")
            .await
    }

    /// Connect the circuit-switched call unless it is already established.
    pub async fn setup_cs_connection(&self) -> AppResult<Transition> {
        self.link.connect().await
    }

    /// Move the call to `band`/`dl_channel`.
    ///
    /// A different band runs the full handover chain and waits for `CEST`; the same band
    /// with a different channel only rewrites the TCH channel.
    pub async fn handover(&mut self, band: GsmBand, dl_channel: &str) -> AppResult<Handover> {
        let current_channel = self.link.read_back(&format!("{}?", TCH_CHANNEL)).await?;
        let current_band = self.link.read_back(TCH_BAND_QUERY).await?;

        let outcome = if current_band != band.symbol() {
            self.set_band_indicator(band).await?;
            self.link
                .apply(&format!("PREPare:GSM:SIGN:HANDover:TARGet {}", band.symbol()))
                .await?;
            self.link
                .apply(&format!("PREPare:GSM:SIGN:HANDover:CHANnel:TCH {}", dl_channel))
                .await?;
            self.link
                .apply(&format!(
                    "PREPare:GSM:SIGN:HANDover:LEVel:TCH {}",
                    HANDOVER_TCH_LEVEL
                ))
                .await?;
            self.link
                .apply(&format!("PREPare:GSM:SIGN:HANDover:TSLot {}", HANDOVER_TIMESLOT))
                .await?;
            self.link
                .command_then_connected("CALL:GSM:SIGN:HANDover:STARt")
                .await?;
            info!("Handover @BAND: {}, DLCH: {}", band, dl_channel);
            Handover::Band
        } else if current_channel != dl_channel {
            self.link
                .apply(&format!("{} {}", TCH_CHANNEL, dl_channel))
                .await?;
            info!("@BAND: {}, DLCH: {}", band, dl_channel);
            Handover::Channel
        } else {
            Handover::None
        };

        if outcome != Handover::None {
            self.refresh_tch().await?;
            debug!("TCH after handover: {:?}", self.tch);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl RatController for GsmController {
    fn link(&self) -> &RatLink {
        &self.link
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.bcch
    }

    /// Sets the BCCH carrier; `bandwidth` does not apply to GSM and is ignored.
    async fn set_downlink_channel(
        &mut self,
        band: &str,
        dl_channel: &str,
        _bandwidth: Option<&str>,
    ) -> AppResult<ChannelConfig> {
        let band: GsmBand = band.parse()?;
        self.set_bcch_downlink_channel(band, dl_channel).await.cloned()
    }

    async fn establish_connection(&self) -> AppResult<()> {
        self.synchronize().await?;
        self.setup_cs_connection().await?;
        Ok(())
    }
}
