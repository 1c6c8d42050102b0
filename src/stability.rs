//! Current stability detection.
//!
//! A sliding window of 0.5 s current samples is kept while the DUT settles. Once the
//! window is full, every new sample evicts the oldest and the window's mean absolute
//! deviation is compared against a threshold. A sample timeline of `samples × 0.5 s`
//! is counted alongside the wall clock so that a timeout shorter than the window can
//! never report stable, whatever the sampler's real speed.

use crate::error::AppResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Duration averaged into one window sample.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Source of averaged current readings (mA).
#[async_trait]
pub trait CurrentSampler: Send + Sync {
    /// Average current over `duration`, in mA.
    async fn measure_current_over(&self, duration: Duration) -> AppResult<f64>;
}

/// Fixed-capacity window of the most recent samples.
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    depth: usize,
    samples: VecDeque<f64>,
}

impl StabilityWindow {
    /// Window holding `depth` samples (at least one).
    pub fn with_depth(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            samples: VecDeque::with_capacity(depth),
        }
    }

    /// Window covering `width` at one sample per [`SAMPLE_INTERVAL`].
    pub fn for_width(width: Duration) -> Self {
        let depth = (width.as_secs_f64() / SAMPLE_INTERVAL.as_secs_f64()).floor() as usize;
        Self::with_depth(depth)
    }

    /// Capacity in samples.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was pushed yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the window holds `depth` samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.depth
    }

    /// Append `sample`, returning the evicted oldest sample when full.
    pub fn push(&mut self, sample: f64) -> Option<f64> {
        let evicted = if self.is_full() {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Mean of the held samples.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Mean absolute deviation from the window mean.
    pub fn mean_absolute_deviation(&self) -> Option<f64> {
        let mean = self.mean()?;
        let total: f64 = self.samples.iter().map(|s| (s - mean).abs()).sum();
        Some(total / self.samples.len() as f64)
    }
}

/// Parameters of one stability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCriteria {
    /// Give up after this long
    pub timeout: Duration,
    /// Sliding window width
    pub window: Duration,
    /// Mean absolute deviation threshold in mA
    pub max_deviation_ma: f64,
}

impl Default for StabilityCriteria {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            window: Duration::from_secs(10),
            max_deviation_ma: 50.0,
        }
    }
}

impl StabilityCriteria {
    /// Default window and threshold with `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Override the deviation threshold.
    pub fn with_max_deviation(mut self, max_deviation_ma: f64) -> Self {
        self.max_deviation_ma = max_deviation_ma;
        self
    }
}

/// Decides settled-vs-timeout over a [`CurrentSampler`].
pub struct CurrentStabilityDetector<'a> {
    sampler: &'a dyn CurrentSampler,
}

impl<'a> CurrentStabilityDetector<'a> {
    /// Detector drawing samples from `sampler`.
    pub fn new(sampler: &'a dyn CurrentSampler) -> Self {
        Self { sampler }
    }

    /// Sample until the window settles below the threshold (`true`) or the timeout
    /// passes (`false`).
    ///
    /// Stability is only evaluated once the window is full; the first evaluation
    /// happens on the sample after the one that fills it.
    pub async fn is_stable(&self, criteria: &StabilityCriteria) -> AppResult<bool> {
        let mut window = StabilityWindow::for_width(criteria.window);
        let started = Instant::now();
        let mut taken: u32 = 0;

        loop {
            let was_full = window.is_full();
            let sample = self.sampler.measure_current_over(SAMPLE_INTERVAL).await?;
            taken += 1;
            window.push(sample);
            let elapsed = started.elapsed().max(SAMPLE_INTERVAL * taken);

            if was_full {
                let deviation = window.mean_absolute_deviation().unwrap_or(f64::INFINITY);
                if deviation < criteria.max_deviation_ma {
                    debug!(
                        "Current is stable after {:?} (deviation {:.3}mA)",
                        elapsed, deviation
                    );
                    return Ok(true);
                }
            }
            if elapsed > criteria.timeout {
                warn!(
                    "Current is unstable, and time runs out after {:?} ({} samples)",
                    elapsed, taken
                );
                return Ok(false);
            }
        }
    }
}
