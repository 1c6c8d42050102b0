//! Full test plan runs against a scripted tester and sampler.

mod common;

use common::{lte_tester, routed_session, script_cell, ScriptedSampler};
use rat_bench::adapters::MockChannel;
use rat_bench::config::{ChannelRecord, LevelsConfig, StabilityConfig, TaskDescriptor};
use rat_bench::error::BenchError;
use rat_bench::rat::{SignalRoute, Technology};
use rat_bench::records::{CurrentReading, MemorySink, PowerReading};
use rat_bench::runner::{RunMode, TestRunner};
use rat_bench::session::InstrumentSession;
use rat_bench::sync::PollPolicy;
use std::sync::Arc;
use std::time::Duration;

const STOP_TRACE: &str = "TRACe:REMote:MODE:FILE1:ENABle OFF";

fn lte_task() -> TaskDescriptor {
    TaskDescriptor {
        format: Technology::Lte,
        configurations: vec![ChannelRecord {
            band: "3".into(),
            dl_channel: "1575".into(),
            bandwidth: Some("10".into()),
            rb_number: Some("12".into()),
            rb_position: Some("LOW".into()),
        }],
    }
}

fn record(band: &str, dl_channel: &str) -> ChannelRecord {
    ChannelRecord {
        band: band.into(),
        dl_channel: dl_channel.into(),
        ..ChannelRecord::default()
    }
}

#[tokio::test(start_paused = true)]
async fn lte_connected_records_every_target_power() {
    let mock = lte_tester("22.3749");
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(412.5);
    let mut sink = MemorySink::new();
    let task = lte_task();

    TestRunner::new(&session, &sampler, &mut sink, RunMode::Connected)
        .run(&[&task])
        .await
        .unwrap();

    let configurations: Vec<&str> = sink
        .records()
        .iter()
        .map(|r| r.configuration.as_str())
        .collect();
    assert_eq!(
        configurations,
        vec![
            "@Band:3, DLCH:1575, BW:10MHz, Power:0 dbm",
            "@Band:3, DLCH:1575, BW:10MHz, Power:10 dbm",
            "@Band:3, DLCH:1575, BW:10MHz, Power:25 dbm",
        ]
    );
    for record in sink.records() {
        assert_eq!(record.technology, Technology::Lte);
        assert_eq!(record.mode, RunMode::Connected);
        assert_eq!(record.power, PowerReading::Measured(22.37));
        assert_eq!(record.current, CurrentReading::Measured(412.5));
    }
    assert_eq!(sink.flush_count(), 1);

    assert_eq!(mock.send_count("CALL:LTE:SIGN:PSWitched:ACTion CONNect"), 1);
    assert_eq!(mock.send_count("CONFigure:LTE:SIGN:UL:PUSCh:TPC:CLTPower 25"), 1);
    assert_eq!(mock.send_count("SOURce:LTE:SIGN:CELL:STATe ON"), 1);
    assert_eq!(mock.send_count("SOURce:LTE:SIGN:CELL:STATe OFF"), 1);
    assert_eq!(mock.send_count(STOP_TRACE), 0);
}

#[tokio::test(start_paused = true)]
async fn lte_standby_camps_without_connecting() {
    let mock = lte_tester("0");
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(2.75);
    let mut sink = MemorySink::new();
    let task = lte_task();

    TestRunner::new(&session, &sampler, &mut sink, RunMode::Standby)
        .run(&[&task])
        .await
        .unwrap();

    assert_eq!(sink.records().len(), 1);
    let record = &sink.records()[0];
    assert_eq!(record.configuration, "@Band:3, DLCH:1575, BW:10MHz");
    assert_eq!(record.power, PowerReading::NotApplicable);
    assert_eq!(record.current, CurrentReading::Measured(2.75));
    assert_eq!(record.stem(), "LTE_standby");

    assert_eq!(mock.send_count("CONFigure:LTE:SIGN:CONNection:DPCYcle P128"), 1);
    assert_eq!(mock.send_count("CONFigure:LTE:SIGN:CONNection:KRRC OFF"), 1);
    assert_eq!(mock.send_count("CALL:LTE:SIGN:PSWitched:ACTion CONNect"), 0);
    assert_eq!(mock.query_count("FETCh:LTE:MEAS:MEValuation:MODulation:AVERage?"), 0);
}

#[tokio::test(start_paused = true)]
async fn unsettled_current_is_recorded_not_raised() {
    let mock = lte_tester("10");
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::new((0..400).map(|i| if i % 2 == 0 { 100.0 } else { 300.0 }));
    let mut sink = MemorySink::new();
    let task = lte_task();

    TestRunner::new(&session, &sampler, &mut sink, RunMode::Connected)
        .with_stability(StabilityConfig {
            timeout: Duration::from_secs(5),
            ..StabilityConfig::default()
        })
        .run(&[&task])
        .await
        .unwrap();

    assert_eq!(sink.records().len(), 3);
    assert!(sink
        .records()
        .iter()
        .all(|r| r.current == CurrentReading::Unstable));
    // The 30 s average is never taken for an unstable current.
    assert!(sampler.calls().iter().all(|d| *d < Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn failure_stops_trace_and_flushes() {
    let mock = lte_tester("10");
    mock.script(
        "FETCh:LTE:MEAS:MEValuation:MODulation:AVERage?",
        &["0,1.0,2.0"],
    );
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(400.0);
    let mut sink = MemorySink::new();
    let task = lte_task();

    let err = TestRunner::new(&session, &sampler, &mut sink, RunMode::Connected)
        .run(&[&task])
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::ReplySchema { .. }));
    assert!(sink.records().is_empty());
    assert_eq!(sink.flush_count(), 1);
    assert_eq!(mock.send_count(STOP_TRACE), 1);
}

#[tokio::test(start_paused = true)]
async fn bounded_poll_gives_up_on_a_dead_cell() {
    let mock = lte_tester("10");
    // The cell never reacts to the ON command.
    mock.script("SOURce:LTE:SIGN:CELL:STATe:ALL?", &["OFF,ADJ"]);
    mock.on_send(
        "SOURce:LTE:SIGN:CELL:STATe ON",
        "SOURce:LTE:SIGN:CELL:STATe:ALL?",
        &["OFF,ADJ"],
    );
    let mut session = InstrumentSession::new(
        Arc::new(mock.clone()),
        PollPolicy::bounded(Duration::from_secs(2)),
    );
    session
        .set_signal_routing(SignalRoute::new("1", "1"))
        .await
        .unwrap();
    let sampler = ScriptedSampler::constant(400.0);
    let mut sink = MemorySink::new();
    let task = lte_task();

    let err = TestRunner::new(&session, &sampler, &mut sink, RunMode::Connected)
        .run(&[&task])
        .await
        .unwrap_err();

    match err {
        BenchError::PollTimeout { query, last_reply, .. } => {
            assert_eq!(query, "SOURce:LTE:SIGN:CELL:STATe:ALL?");
            assert_eq!(last_reply.as_deref(), Some("OFF,ADJ"));
        }
        other => panic!("expected a poll timeout, got {other}"),
    }
    assert_eq!(mock.send_count(STOP_TRACE), 1);
}

#[tokio::test(start_paused = true)]
async fn wcdma_connects_once_and_measures_per_record() {
    let mock = MockChannel::rat_tester();
    mock.script("ROUTe:WCDMa:SIGN:SCENario:SCELl?", &["RF1C,RX1,RF1C,TX1"]);
    mock.script("CONFigure:WCDMa:SIGN:CARRier:BAND?", &["OB1"]);
    mock.script(
        "CONFigure:WCDMa:SIGN:RFSettings:CARRier:CHANnel:DL?",
        &["10700"],
    );
    script_cell(&mock, "SOURce:WCDMa:SIGN:CELL:STATe");
    mock.script("FETCh:WCDMa:SIGN:CSWitched:STATe?", &["ON", "REG"]);
    mock.on_send(
        "CALL:WCDMa:SIGN:CSWitched:ACTion CONNect",
        "FETCh:WCDMa:SIGN:CSWitched:STATe?",
        &["REG", "CEST"],
    );
    mock.script("FETCh:WCDMa:MEAS:MEValuation:STATe:ALL?", &["RDY,ADJ,ADJ"]);
    mock.script(
        "FETCh:WCDMa:MEAS:MEValuation:TRACe:UEPower:AVERage?",
        &["0,23.456,23.1"],
    );
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(350.0);
    let mut sink = MemorySink::new();
    let task = TaskDescriptor {
        format: Technology::Wcdma,
        configurations: vec![record("1", "10700"), record("1", "10838")],
    };

    TestRunner::new(&session, &sampler, &mut sink, RunMode::Connected)
        .with_levels(LevelsConfig {
            target_powers: vec!["23".into()],
            ..LevelsConfig::default()
        })
        .run(&[&task])
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].configuration, "@Band:1, DLCH:10700, Power:23 dbm");
    assert_eq!(records[1].configuration, "@Band:1, DLCH:10838, Power:23 dbm");
    assert_eq!(records[1].power, PowerReading::Measured(23.46));
    assert_eq!(mock.send_count("CALL:WCDMa:SIGN:CSWitched:ACTion CONNect"), 1);
    assert_eq!(
        mock.send_count("CONFigure:WCDMa:SIGN:CONNection:UETerminate VOICe"),
        1
    );
    assert_eq!(
        mock.send_count("CONFigure:WCDMa:SIGN:RFSettings:CARRier:COPower -80"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn gsm_standby_cycles_output_on_band_change() {
    let mock = MockChannel::rat_tester();
    mock.script("ROUTe:GSM:SIGN:SCENario:SCELl?", &["RF1C,RX1,RF1C,TX1"]);
    mock.script("CONFigure:GSM:SIGN:RFSettings:LEVel:BCCH?", &["-80"]);
    mock.script("CONFigure:GSM:SIGN:RFSettings:LEVel:TCH?", &["-80"]);
    mock.script("CONFigure:GSM:SIGN:BAND:BCCH?", &["G18"]);
    mock.script("CONFigure:GSM:SIGN:RFSettings:CHANnel:BCCH?", &["512"]);
    mock.script("SENSe:GSM:SIGN:BAND:TCH?", &["G18"]);
    mock.script("CONFigure:GSM:SIGN:RFSettings:CHANnel:TCH?", &["512"]);
    mock.script("FETCh:GSM:SIGN:CSWitched:STATe?", &["SYNC"]);
    script_cell(&mock, "SOURce:GSM:SIGN:CELL:STATe");
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(3.1);
    let mut sink = MemorySink::new();
    let task = TaskDescriptor {
        format: Technology::Gsm,
        configurations: vec![
            record("DCS1800", "512"),
            record("DCS1800", "600"),
            record("GSM900", "62"),
        ],
    };

    TestRunner::new(&session, &sampler, &mut sink, RunMode::Standby)
        .run(&[&task])
        .await
        .unwrap();

    let configurations: Vec<&str> = sink
        .records()
        .iter()
        .map(|r| r.configuration.as_str())
        .collect();
    assert_eq!(
        configurations,
        vec![
            "@Band:DCS1800, DLCH:512",
            "@Band:DCS1800, DLCH:600",
            "@Band:GSM900, DLCH:62",
        ]
    );
    assert_eq!(mock.send_count("CONFigure:GSM:SIGN:BAND:BCCH G18"), 1);
    assert_eq!(mock.send_count("CONFigure:GSM:SIGN:BAND:BCCH G09"), 1);
    // Two band changes plus the final switch-off.
    assert_eq!(mock.send_count("SOURce:GSM:SIGN:CELL:STATe OFF"), 3);
    assert_eq!(mock.send_count("SOURce:GSM:SIGN:CELL:STATe ON"), 2);
    assert_eq!(mock.send_count("CONFigure:GSM:SIGN:CELL:BSPamfrms 5"), 1);
    assert_eq!(mock.send_count("CONFigure:GSM:SIGN:DTX OFF"), 1);
}
