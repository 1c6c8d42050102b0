//! Programmable DC source (Agilent 66319B).
//!
//! Supplies the DUT and samples its current draw. Every setting is confirmed through
//! `*OPC?`, which this instrument answers with `+1`.

use crate::adapters::{CommandChannel, VisaChannel};
use crate::error::{AppResult, BenchError};
use crate::rat::reply::round_to;
use crate::stability::CurrentSampler;
use crate::sync::{CompletionGate, PollPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Points per measurement sweep.
pub const SWEEP_POINTS: u32 = 4096;

/// Tolerance when comparing a requested voltage with the protection level.
const VOLTAGE_EPSILON: f64 = 1e-7;

/// Output and acquisition settings applied at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DcSourceSettings {
    /// Over-voltage protection level in volts
    pub max_voltage: f64,
    /// Sweep sampling period in seconds
    pub sampling_period_s: f64,
    /// Current measurement range (0.02A, 1A or 3A)
    pub current_range: String,
}

impl Default for DcSourceSettings {
    fn default() -> Self {
        Self {
            max_voltage: 4.4,
            sampling_period_s: 15.6e-6,
            current_range: "3A".to_string(),
        }
    }
}

/// DC source driver.
pub struct DcSource {
    gate: CompletionGate,
    settings: DcSourceSettings,
}

impl DcSource {
    /// Open `resource` over VISA and apply `settings`.
    pub async fn connect(
        resource: &str,
        timeout: Duration,
        settings: DcSourceSettings,
        policy: PollPolicy,
    ) -> AppResult<Self> {
        let channel = VisaChannel::connect(resource, timeout).await?;
        info!("Connected to DC source: {}", channel.describe());
        Self::new(Arc::new(channel), settings, policy).await
    }

    /// Apply voltage protection, the sweep and the current range over `channel`.
    pub async fn new(
        channel: Arc<dyn CommandChannel>,
        settings: DcSourceSettings,
        policy: PollPolicy,
    ) -> AppResult<Self> {
        let mut source = Self {
            gate: CompletionGate::dc_source(channel, policy),
            settings,
        };
        source
            .gate
            .confirm_after(&format!(
                "voltage:protection:level {:.1};state on",
                source.settings.max_voltage
            ))
            .await?;
        source
            .gate
            .confirm_after(&format!(
                "sense:sweep:points {};tinterval {:e}",
                SWEEP_POINTS, source.settings.sampling_period_s
            ))
            .await?;
        let range = source.settings.current_range.clone();
        source.set_measure_current_range(&range).await?;
        Ok(source)
    }

    /// Settings currently in effect.
    pub fn settings(&self) -> &DcSourceSettings {
        &self.settings
    }

    /// Restore factory defaults and clear status.
    pub async fn reset(&self) -> AppResult<()> {
        self.gate.send("*rst; status:preset; *cls").await
    }

    /// Select the DC current detector and measurement range.
    pub async fn set_measure_current_range(&mut self, range: &str) -> AppResult<()> {
        self.gate
            .confirm_after(&format!("sense:current:detector dc;range {}", range))
            .await?;
        self.settings.current_range = range.to_string();
        Ok(())
    }

    /// Set the output voltage.
    ///
    /// # Errors
    /// [`BenchError::OverVoltage`] if `voltage` exceeds the protection level; nothing is sent.
    pub async fn set_voltage(&self, voltage: f64) -> AppResult<()> {
        if voltage - self.settings.max_voltage > VOLTAGE_EPSILON {
            return Err(BenchError::OverVoltage {
                requested: voltage,
                limit: self.settings.max_voltage,
            });
        }
        self.gate
            .confirm_after(&format!("voltage {:.1}", voltage))
            .await?;
        info!("Set voltage: {:.1}V", voltage);
        Ok(())
    }

    /// Switch the output on.
    pub async fn enable_output(&self) -> AppResult<()> {
        self.gate.confirm_after("output1 on").await?;
        self.gate.send("display on").await
    }

    /// Number of `MEAS:CURR?` sweeps averaged over `duration`.
    pub fn sweeps_for(&self, duration: Duration) -> u32 {
        let sweep = self.settings.sampling_period_s * f64::from(SWEEP_POINTS);
        let count = (duration.as_secs_f64() / sweep).round();
        if count < 1.0 {
            1
        } else {
            count as u32
        }
    }

    async fn sample_current(&self, duration: Duration) -> AppResult<f64> {
        let sweeps = self.sweeps_for(duration);
        let mut total = 0.0;
        for _ in 0..sweeps {
            let reply = self.gate.channel().query("MEAS:CURR?").await?;
            let amps: f64 = reply.trim().parse().map_err(|_| {
                BenchError::ParseReply(format!("MEAS:CURR? returned '{}'", reply.trim()))
            })?;
            total += amps;
        }
        let milliamps = round_to(total / f64::from(sweeps) * 1000.0, 1);
        debug!("{} sweeps over {:?}: {}mA", sweeps, duration, milliamps);
        Ok(milliamps)
    }

    /// Average current over `duration`, in mA rounded to one decimal.
    pub async fn measure_current(&self, duration: Duration) -> AppResult<f64> {
        let current = self.sample_current(duration).await?;
        info!("Average current: {:.1}mA", current);
        Ok(current)
    }
}

#[async_trait]
impl CurrentSampler for DcSource {
    async fn measure_current_over(&self, duration: Duration) -> AppResult<f64> {
        self.sample_current(duration).await
    }
}
