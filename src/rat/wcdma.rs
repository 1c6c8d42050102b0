//! WCDMA controller (circuit-switched voice)

use super::link::{RatLink, RatVocabulary};
use super::reply::WCDMA_UE_POWER;
use super::{operating_band, strip_operating_band};
use super::{ChannelConfig, RatController, SignalRoute, Technology};
use crate::adapters::CommandChannel;
use crate::error::AppResult;
use crate::sync::{PollPolicy, StatePredicate, Transition};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// WCDMA command vocabulary.
pub static WCDMA_VOCABULARY: RatVocabulary = RatVocabulary {
    technology: Technology::Wcdma,
    route: "ROUTe:WCDMa:SIGN:SCENario:SCELl",
    cell_state: "SOURce:WCDMa:SIGN:CELL:STATe",
    connection_state: "FETCh:WCDMa:SIGN:CSWitched:STATe?",
    connect_action: "CALL:WCDMa:SIGN:CSWitched:ACTion CONNect",
    measurement_start: "INIT:WCDMa:MEAS:MEValuation",
    measurement_state: "FETCh:WCDMa:MEAS:MEValuation:STATe:ALL?",
    measurement_result: "FETCh:WCDMa:MEAS:MEValuation:TRACe:UEPower:AVERage?",
    measurement_schema: WCDMA_UE_POWER,
};

/// Default PRACH DRX cycle length coefficient.
pub const DEFAULT_DRX_CYCLE: u8 = 7;

/// WCDMA controller.
pub struct WcdmaController {
    link: RatLink,
    config: ChannelConfig,
}

impl WcdmaController {
    /// Bind the route and set up single-shot UE power measurements.
    pub async fn new(
        channel: Arc<dyn CommandChannel>,
        route: SignalRoute,
        policy: PollPolicy,
    ) -> AppResult<Self> {
        let link = RatLink::bind(channel, route, policy, &WCDMA_VOCABULARY).await?;
        link.send("ROUTe:WCDMa:MEAS:SCENario:CSPath 'WCDMA Sig1'")
            .await?;
        link.send("CONFigure:WCDMa:MEAS:MEValuation:REPetition SINGleshot")
            .await?;
        link.send("CONFigure:WCDMa:MEAS:MEValuation:RESult:UEPower ON")
            .await?;
        Ok(Self {
            link,
            config: ChannelConfig::default(),
        })
    }

    /// Set the downlink carrier power (dBm).
    pub async fn set_downlink_power(&self, power: &str) -> AppResult<()> {
        self.link
            .apply(&format!(
                "CONFigure:WCDMa:SIGN:RFSettings:CARRier:COPower {}",
                power
            ))
            .await?;
        info!("Set downlink power as {}dBm", power);
        Ok(())
    }

    /// Make UE-terminated calls voice calls.
    pub async fn set_voice_connection(&self) -> AppResult<()> {
        self.link
            .send("CONFigure:WCDMa:SIGN:CONNection:UETerminate VOICe")
            .await
    }

    /// Set the PRACH DRX cycle length coefficient.
    pub async fn set_prach_drx_cycle(&self, cycle: u8) -> AppResult<()> {
        self.link
            .send(&format!("CONFigure:WCDMa:SIGN:UL:PRACh:DRXCycle {}", cycle))
            .await
    }

    /// Closed-loop power control towards `power` dBm.
    pub async fn set_closed_loop_power(&self, power: &str) -> AppResult<()> {
        self.link
            .apply("CONFigure:WCDMa:SIGN:UL:TPC:SET CLOop")
            .await?;
        self.link
            .apply(&format!("CONFigure:WCDMa:SIGN:UL:TPC:TPOWer {}", power))
            .await?;
        info!("Set closed loop tx power as {}dBm", power);
        Ok(())
    }

    /// Command the UE to transmit at maximum power (all-up TPC bits).
    pub async fn set_max_power(&self) -> AppResult<()> {
        self.link.apply("CONFigure:WCDMa:SIGN:UL:TPC:SET ALL1").await?;
        info!("Set tx power as max power");
        Ok(())
    }

    /// Wait until the UE registers (`REG`).
    pub async fn register(&self) -> AppResult<Transition> {
        self.link
            .await_connection_state(&StatePredicate::prefix("REG"), "REG")
            .await
    }

    /// Connect the circuit-switched call unless it is already established.
    pub async fn setup_cs_connection(&self) -> AppResult<Transition> {
        self.link.connect().await
    }
}

#[async_trait]
impl RatController for WcdmaController {
    fn link(&self) -> &RatLink {
        &self.link
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Band and channel go out in one carrier command; `bandwidth` is ignored.
    async fn set_downlink_channel(
        &mut self,
        band: &str,
        dl_channel: &str,
        _bandwidth: Option<&str>,
    ) -> AppResult<ChannelConfig> {
        let band = operating_band("WCDMA band", band)?;
        self.link
            .apply(&format!(
                "CONFigure:WCDMa:SIGN:RFSettings:CARRier:DL OB{}, {}",
                band, dl_channel
            ))
            .await?;

        let echo = self.link.read_back("CONFigure:WCDMa:SIGN:CARRier:BAND?").await?;
        self.config = ChannelConfig {
            band: strip_operating_band(&echo),
            dl_channel: self
                .link
                .read_back("CONFigure:WCDMa:SIGN:RFSettings:CARRier:CHANnel:DL?")
                .await?,
            ..ChannelConfig::default()
        };
        info!(
            "@BAND: OB{}, DLCH: {}",
            self.config.band, self.config.dl_channel
        );
        Ok(self.config.clone())
    }

    async fn establish_connection(&self) -> AppResult<()> {
        self.register().await?;
        self.setup_cs_connection().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockChannel;
    use crate::error::BenchError;

    async fn controller(mock: &MockChannel) -> WcdmaController {
        mock.script("ROUTe:WCDMa:SIGN:SCENario:SCELl?", &["RF1C,RX1,RF1C,TX1"]);
        WcdmaController::new(
            Arc::new(mock.clone()),
            SignalRoute::new("1", "1"),
            PollPolicy::unbounded(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_construction_enables_ue_power_result() {
        let mock = MockChannel::rat_tester();
        controller(&mock).await;
        assert_eq!(
            mock.sent()[1..],
            [
                "ROUTe:WCDMa:MEAS:SCENario:CSPath 'WCDMA Sig1'",
                "CONFigure:WCDMa:MEAS:MEValuation:REPetition SINGleshot",
                "CONFigure:WCDMa:MEAS:MEValuation:RESult:UEPower ON",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_carrier_in_one_command() {
        let mock = MockChannel::rat_tester();
        let mut wcdma = controller(&mock).await;
        mock.script("CONFigure:WCDMa:SIGN:CARRier:BAND?", &["OB1"]);
        mock.script(
            "CONFigure:WCDMa:SIGN:RFSettings:CARRier:CHANnel:DL?",
            &["10700"],
        );
        mock.clear_log();

        let config = wcdma
            .set_downlink_channel("1", "10562", None)
            .await
            .unwrap();
        assert_eq!(
            mock.sent(),
            vec!["CONFigure:WCDMa:SIGN:RFSettings:CARRier:DL OB1, 10562"]
        );
        assert_eq!(config.band, "1");
        // retained value is the echo, not the request
        assert_eq!(config.dl_channel, "10700");
    }

    #[tokio::test]
    async fn test_invalid_band_rejected() {
        let mock = MockChannel::rat_tester();
        let mut wcdma = controller(&mock).await;
        mock.clear_log();

        let err = wcdma
            .set_downlink_channel("I", "10562", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::UnknownCode { .. }));
        assert!(mock.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_is_passive() {
        let mock = MockChannel::rat_tester();
        let wcdma = controller(&mock).await;
        mock.script("FETCh:WCDMa:SIGN:CSWitched:STATe?", &["ON", "ON", "ON", "REG"]);
        mock.clear_log();

        let transition = wcdma.register().await.unwrap();
        assert_eq!(transition, Transition::Reached("REG".into()));
        assert!(mock.sent().is_empty());
        assert_eq!(mock.query_count("FETCh:WCDMa:SIGN:CSWitched:STATe?"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_loop_power_confirms_each_step() {
        let mock = MockChannel::rat_tester();
        let wcdma = controller(&mock).await;
        mock.clear_log();

        wcdma.set_closed_loop_power("10").await.unwrap();
        assert_eq!(
            mock.sent(),
            vec![
                "CONFigure:WCDMa:SIGN:UL:TPC:SET CLOop",
                "CONFigure:WCDMa:SIGN:UL:TPC:TPOWer 10",
            ]
        );
        assert_eq!(mock.query_count("*OPC?"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_power_from_ue_power_trace() {
        let mock = MockChannel::rat_tester();
        let wcdma = controller(&mock).await;
        mock.script("FETCh:WCDMa:MEAS:MEValuation:STATe:ALL?", &["RDY,ADJ,ALL"]);
        mock.script(
            "FETCh:WCDMa:MEAS:MEValuation:TRACe:UEPower:AVERage?",
            &["0,23.14501,23.1,23.0"],
        );

        assert_eq!(wcdma.measure_average_tx_power().await.unwrap(), 23.15);
    }
}
