//! Result files written by a full run.
#![cfg(feature = "storage_csv")]

mod common;

use common::{lte_tester, routed_session, ScriptedSampler};
use rat_bench::config::{ChannelRecord, LevelsConfig, TaskDescriptor};
use rat_bench::rat::Technology;
use rat_bench::records::CsvRecorder;
use rat_bench::runner::{RunMode, TestRunner};
use tempfile::tempdir;

#[tokio::test(start_paused = true)]
async fn lte_run_writes_tab_separated_file() {
    let mock = lte_tester("22.3749");
    let session = routed_session(&mock).await;
    let sampler = ScriptedSampler::constant(412.5);
    let dir = tempdir().unwrap();
    let mut recorder = CsvRecorder::new(dir.path()).unwrap();
    let task = TaskDescriptor {
        format: Technology::Lte,
        configurations: vec![ChannelRecord {
            band: "3".into(),
            dl_channel: "1575".into(),
            bandwidth: Some("10".into()),
            rb_number: Some("12".into()),
            rb_position: Some("LOW".into()),
        }],
    };

    TestRunner::new(&session, &sampler, &mut recorder, RunMode::Connected)
        .with_levels(LevelsConfig {
            target_powers: vec!["23".into()],
            ..LevelsConfig::default()
        })
        .run(&[&task])
        .await
        .unwrap();

    let text = std::fs::read_to_string(dir.path().join("LTE.txt")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Configuration\tActual Power(dbm)\tCurrent(mA)",
            "@Band:3, DLCH:1575, BW:10MHz, Power:23 dbm\t22.37\t412.5",
        ]
    );
    assert!(!dir.path().join("LTE_standby.txt").exists());
}
