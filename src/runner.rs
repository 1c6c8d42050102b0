//! Test plan execution.
//!
//! Runs the configured tasks in GSM, WCDMA, LTE order. A connected run measures
//! transmit power and current per target power with a call up; a standby run
//! measures idle current with the UE camped. Failures stop the run at the first
//! error, after which the remote trace is stopped and the sink flushed.

use crate::config::{BenchConfig, ChannelRecord, LevelsConfig, StabilityConfig, TaskDescriptor};
use crate::dc_source::{DcSource, DcSourceSettings};
use crate::error::{AppResult, BenchError};
use crate::rat::{GsmBand, PagingCycle, RatController, Technology};
use crate::records::{CsvRecorder, CurrentReading, PowerReading, ResultRecord, ResultSink};
use crate::session::InstrumentSession;
use crate::stability::{CurrentSampler, CurrentStabilityDetector, StabilityCriteria};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Kind of current measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Call established, current measured per uplink power
    Connected,
    /// UE camped in idle mode, power not applicable
    Standby,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Standby => f.write_str("standby"),
        }
    }
}

fn required<'r>(value: &'r Option<String>, name: &'static str) -> AppResult<&'r str> {
    value.as_deref().ok_or(BenchError::MissingParameter(name))
}

/// Drives one test plan against a tester session and a current sampler.
pub struct TestRunner<'a> {
    session: &'a InstrumentSession,
    sampler: &'a dyn CurrentSampler,
    sink: &'a mut dyn ResultSink,
    mode: RunMode,
    stability: StabilityConfig,
    levels: LevelsConfig,
}

impl<'a> TestRunner<'a> {
    /// Runner recording into `sink`.
    pub fn new(
        session: &'a InstrumentSession,
        sampler: &'a dyn CurrentSampler,
        sink: &'a mut dyn ResultSink,
        mode: RunMode,
    ) -> Self {
        Self {
            session,
            sampler,
            sink,
            mode,
            stability: StabilityConfig::default(),
            levels: LevelsConfig::default(),
        }
    }

    /// Override the stability settings.
    pub fn with_stability(mut self, stability: StabilityConfig) -> Self {
        self.stability = stability;
        self
    }

    /// Override the levels.
    pub fn with_levels(mut self, levels: LevelsConfig) -> Self {
        self.levels = levels;
        self
    }

    /// Run `tasks` in the order given and flush the sink.
    ///
    /// On the first error the remote trace is stopped and the sink flushed, both
    /// best-effort, and the error is returned.
    pub async fn run(&mut self, tasks: &[&TaskDescriptor]) -> AppResult<()> {
        info!("Starting {} run with {} task(s)", self.mode, tasks.len());
        for task in tasks {
            if let Err(err) = self.run_task(task).await {
                error!("{} task failed: {}", task.format, err);
                if let Err(trace_err) = self.session.stop_trace().await {
                    warn!("Failed to stop remote trace: {}", trace_err);
                }
                if let Err(flush_err) = self.sink.flush().await {
                    warn!("Failed to flush results: {}", flush_err);
                }
                return Err(err);
            }
        }
        self.sink.flush().await?;
        info!("Run complete");
        Ok(())
    }

    async fn run_task(&mut self, task: &TaskDescriptor) -> AppResult<()> {
        info!(
            "Running {} task ({} configuration(s))",
            task.format,
            task.configurations.len()
        );
        match (task.format, self.mode) {
            (Technology::Gsm, RunMode::Connected) => self.gsm_connected(&task.configurations).await,
            (Technology::Gsm, RunMode::Standby) => self.gsm_standby(&task.configurations).await,
            (Technology::Wcdma, mode) => self.wcdma(&task.configurations, mode).await,
            (Technology::Lte, mode) => self.lte(&task.configurations, mode).await,
        }
    }

    async fn current_reading(&self, max_deviation_ma: f64) -> AppResult<CurrentReading> {
        let criteria = StabilityCriteria {
            timeout: self.stability.timeout,
            window: self.stability.window,
            max_deviation_ma,
        };
        if !CurrentStabilityDetector::new(self.sampler)
            .is_stable(&criteria)
            .await?
        {
            return Ok(CurrentReading::Unstable);
        }
        let current = self
            .sampler
            .measure_current_over(self.stability.measure_duration)
            .await?;
        info!("Average current: {:.1}mA", current);
        Ok(CurrentReading::Measured(current))
    }

    async fn record(
        &mut self,
        technology: Technology,
        configuration: String,
        power: PowerReading,
        current: CurrentReading,
    ) -> AppResult<()> {
        info!("{}: {} / {} / {}", technology, configuration, power, current);
        self.sink
            .record(ResultRecord {
                technology,
                mode: self.mode,
                configuration,
                power,
                current,
            })
            .await
    }

    async fn lte(&mut self, records: &[ChannelRecord], mode: RunMode) -> AppResult<()> {
        let mut lte = self.session.lte().await?;
        let levels = self.levels.clone();

        for (index, item) in records.iter().enumerate() {
            let bandwidth = required(&item.bandwidth, "bandwidth")?;
            lte.set_downlink_channel(&item.band, &item.dl_channel, Some(bandwidth))
                .await?;
            lte.config_rmc(
                required(&item.rb_number, "rb_number")?,
                required(&item.rb_position, "rb_position")?,
            )
            .await?;

            if index == 0 {
                lte.set_rsep_level(&levels.lte_rsep_level).await?;
                lte.set_open_loop_power(&levels.lte_open_loop_power).await?;
                if mode == RunMode::Standby {
                    lte.set_paging_cycle(levels.lte_paging_cycle.parse::<PagingCycle>()?)
                        .await?;
                    lte.release_rrc_after_attach().await?;
                }
                lte.enable_output().await?;
                lte.attach().await?;
            }

            let config_info = format!(
                "@Band:{}, DLCH:{}, BW:{}MHz",
                item.band, item.dl_channel, bandwidth
            );
            match mode {
                RunMode::Connected => {
                    lte.connect_rrc().await?;
                    for target in &levels.target_powers {
                        lte.set_closed_loop_power(target).await?;
                        let power = lte.measure_average_tx_power().await?;
                        let current = self.current_reading(self.stability.max_deviation_ma).await?;
                        self.record(
                            Technology::Lte,
                            format!("{}, Power:{} dbm", config_info, target),
                            PowerReading::Measured(power),
                            current,
                        )
                        .await?;
                    }
                }
                RunMode::Standby => {
                    let current = self
                        .current_reading(self.stability.standby_max_deviation_ma)
                        .await?;
                    self.record(Technology::Lte, config_info, PowerReading::NotApplicable, current)
                        .await?;
                }
            }
        }

        lte.disable_output().await
    }

    async fn wcdma(&mut self, records: &[ChannelRecord], mode: RunMode) -> AppResult<()> {
        let mut wcdma = self.session.wcdma().await?;
        let levels = self.levels.clone();

        for (index, item) in records.iter().enumerate() {
            wcdma
                .set_downlink_channel(&item.band, &item.dl_channel, None)
                .await?;

            if index == 0 {
                wcdma.set_downlink_power(&levels.wcdma_downlink_power).await?;
                match mode {
                    RunMode::Connected => wcdma.set_voice_connection().await?,
                    RunMode::Standby => wcdma.set_prach_drx_cycle(levels.wcdma_drx_cycle).await?,
                }
                wcdma.enable_output().await?;
                wcdma.register().await?;
            }

            let config_info = format!("@Band:{}, DLCH:{}", item.band, item.dl_channel);
            match mode {
                RunMode::Connected => {
                    wcdma.setup_cs_connection().await?;
                    for target in &levels.target_powers {
                        wcdma.set_closed_loop_power(target).await?;
                        let power = wcdma.measure_average_tx_power().await?;
                        let current = self.current_reading(self.stability.max_deviation_ma).await?;
                        self.record(
                            Technology::Wcdma,
                            format!("{}, Power:{} dbm", config_info, target),
                            PowerReading::Measured(power),
                            current,
                        )
                        .await?;
                    }
                }
                RunMode::Standby => {
                    let current = self
                        .current_reading(self.stability.standby_max_deviation_ma)
                        .await?;
                    self.record(
                        Technology::Wcdma,
                        config_info,
                        PowerReading::NotApplicable,
                        current,
                    )
                    .await?;
                }
            }
        }

        wcdma.disable_output().await
    }

    async fn gsm_connected(&mut self, records: &[ChannelRecord]) -> AppResult<()> {
        let mut gsm = self.session.gsm().await?;
        let levels = self.levels.clone();

        for (index, item) in records.iter().enumerate() {
            let band: GsmBand = item.band.parse()?;
            if index == 0 {
                gsm.set_bcch_downlink_channel(
                    levels.gsm_initial_band.parse()?,
                    &levels.gsm_initial_channel,
                )
                .await?;
                gsm.set_tch_downlink_channel(&levels.gsm_initial_channel)
                    .await?;
                gsm.set_bcch_level(&levels.gsm_bcch_level).await?;
                gsm.set_tch_level(&levels.gsm_tch_level).await?;
                gsm.enable_output().await?;
                gsm.synchronize().await?;
            }

            gsm.setup_cs_connection().await?;
            gsm.handover(band, &item.dl_channel).await?;

            let pcl = band.max_power_pcl();
            gsm.set_tch_pcl(pcl).await?;
            let power = gsm.measure_average_tx_power().await?;
            let current = self.current_reading(self.stability.max_deviation_ma).await?;
            self.record(
                Technology::Gsm,
                format!("@Band:{}, DLCH:{}, Power:{} dbm", band, item.dl_channel, pcl),
                PowerReading::Measured(power),
                current,
            )
            .await?;
        }

        gsm.disable_output().await
    }

    async fn gsm_standby(&mut self, records: &[ChannelRecord]) -> AppResult<()> {
        let mut gsm = self.session.gsm().await?;
        let levels = self.levels.clone();
        let mut current_band: Option<GsmBand> = None;

        for (index, item) in records.iter().enumerate() {
            let band: GsmBand = item.band.parse()?;
            if index == 0 {
                gsm.set_bcch_level(&levels.gsm_bcch_level).await?;
                gsm.set_tch_level(&levels.gsm_tch_level).await?;
                gsm.set_bspamfrms(levels.gsm_bspamfrms).await?;
                gsm.disable_dtx().await?;
            }

            // The BCCH cannot move while the cell is on.
            if current_band != Some(band) {
                current_band = Some(band);
                gsm.disable_output().await?;
                gsm.set_bcch_downlink_channel(band, &item.dl_channel).await?;
                gsm.enable_output().await?;
                gsm.synchronize().await?;
            }
            gsm.set_tch_downlink_channel(&item.dl_channel).await?;

            // Idle current is judged against the connected-mode threshold for GSM.
            let current = self.current_reading(self.stability.max_deviation_ma).await?;
            self.record(
                Technology::Gsm,
                format!("@Band:{}, DLCH:{}", band, item.dl_channel),
                PowerReading::NotApplicable,
                current,
            )
            .await?;
        }

        gsm.disable_output().await
    }
}

/// Connect both instruments as `config` describes, run its tasks and record the
/// results into a timestamped folder below `application.output_dir`.
pub async fn run_from_config(config: &BenchConfig, mode: RunMode) -> AppResult<()> {
    let policy = config.polling.policy();

    let mut session =
        InstrumentSession::connect(&config.tester.resource, config.tester.timeout, policy).await?;
    session.reset().await?;
    if config.tester.trace {
        session.start_trace().await?;
    }
    session
        .set_signal_routing(config.routing.signal_route())
        .await?;
    if let Some(table) = &config.correction {
        session.set_correction_table(table).await?;
    }

    let range = match mode {
        RunMode::Connected => config.dc_source.current_range.clone(),
        RunMode::Standby => config.dc_source.standby_current_range.clone(),
    };
    let dc_source = DcSource::connect(
        &config.dc_source.resource,
        config.dc_source.timeout,
        DcSourceSettings {
            max_voltage: config.dc_source.max_voltage,
            sampling_period_s: config.dc_source.sampling_period_s,
            current_range: range,
        },
        policy,
    )
    .await?;
    dc_source.set_voltage(config.dc_source.voltage).await?;
    dc_source.enable_output().await?;

    let mut recorder = CsvRecorder::timestamped(&config.application.output_dir)?;
    let tasks = config.ordered_tasks();
    TestRunner::new(&session, &dc_source, &mut recorder, mode)
        .with_stability(config.stability.clone())
        .with_levels(config.levels.clone())
        .run(&tasks)
        .await
}
