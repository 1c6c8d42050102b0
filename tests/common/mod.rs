//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rat_bench::adapters::MockChannel;
use rat_bench::error::AppResult;
use rat_bench::rat::SignalRoute;
use rat_bench::session::InstrumentSession;
use rat_bench::stability::CurrentSampler;
use rat_bench::sync::PollPolicy;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed stream of currents (mA); the last value repeats.
pub struct ScriptedSampler {
    stream: Mutex<VecDeque<f64>>,
    calls: Mutex<Vec<Duration>>,
}

impl ScriptedSampler {
    pub fn new(stream: impl IntoIterator<Item = f64>) -> Self {
        Self {
            stream: Mutex::new(stream.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn constant(current: f64) -> Self {
        Self::new([current])
    }

    /// Durations requested so far.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CurrentSampler for ScriptedSampler {
    async fn measure_current_over(&self, duration: Duration) -> AppResult<f64> {
        self.calls.lock().unwrap().push(duration);
        let mut stream = self.stream.lock().unwrap();
        let value = if stream.len() > 1 {
            stream.pop_front().unwrap()
        } else {
            *stream.front().unwrap()
        };
        Ok(value)
    }
}

/// LTE modulation result with the TX power at field 17.
pub fn lte_modulation_reply(power: &str) -> String {
    let mut fields: Vec<String> = (0..22).map(|i| format!("{}.0", i)).collect();
    fields[0] = "0".to_string();
    fields[17] = power.to_string();
    fields.join(",")
}

/// Cell state that follows the ON/OFF commands of `cell_state`.
pub fn script_cell(mock: &MockChannel, cell_state: &str) {
    let query = format!("{}:ALL?", cell_state);
    mock.script(&query, &["OFF,ADJ"]);
    mock.on_send(&format!("{} ON", cell_state), &query, &["OFF,PEND", "ON,ADJ"]);
    mock.on_send(&format!("{} OFF", cell_state), &query, &["ON,PEND", "OFF,ADJ"]);
}

/// Tester that accepts an LTE run on band 3, channel 1575, 10 MHz.
pub fn lte_tester(power: &str) -> MockChannel {
    let mock = MockChannel::rat_tester();
    mock.script("ROUTe:LTE:SIGN:SCENario:SCELl?", &["RF1C,RX1,RF1C,TX1"]);
    mock.script("CONFigure:LTE:SIGN:BAND?", &["OB3"]);
    mock.script("CONFigure:LTE:SIGN:RFSettings:CHANnel:DL?", &["1575"]);
    mock.script("CONFigure:LTE:SIGN:CELL:BANDwidth:DL?", &["B100"]);
    mock.script("CONFigure:LTE:SIGN:RFSettings:CHANnel:UL?", &["19575"]);
    mock.script("CONFigure:LTE:SIGN:CONNection:RMC:RBPosition:UL?", &["LOW"]);
    mock.script("CONFigure:LTE:SIGN:CONNection:RMC:UL?", &["N12,QPSK,KEEP"]);
    mock.script("CONF:LTE:SIGN:DL:RSEP:LEV?", &["-85"]);
    script_cell(&mock, "SOURce:LTE:SIGN:CELL:STATe");
    mock.script("FETCH:LTE:SIGN:PSWitched:STATe?", &["ON", "ATT"]);
    mock.on_send(
        "CALL:LTE:SIGN:PSWitched:ACTion CONNect",
        "FETCH:LTE:SIGN:PSWitched:STATe?",
        &["ATT", "CEST"],
    );
    mock.script(
        "FETCh:LTE:MEAS:MEValuation:STATe:ALL?",
        &["RDY,ADJ,INV", "RDY,ADJ,ADJ"],
    );
    mock.script(
        "FETCh:LTE:MEAS:MEValuation:MODulation:AVERage?",
        &[lte_modulation_reply(power).as_str()],
    );
    mock
}

/// Session on RF1COM, converter 1, polling without a deadline.
pub async fn routed_session(mock: &MockChannel) -> InstrumentSession {
    let mut session = InstrumentSession::new(Arc::new(mock.clone()), PollPolicy::unbounded());
    session
        .set_signal_routing(SignalRoute::new("1", "1"))
        .await
        .unwrap();
    session
}
