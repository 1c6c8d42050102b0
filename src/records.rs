//! Result records and sinks with clean feature flag handling.

use crate::error::AppResult;
use crate::rat::Technology;
use crate::runner::RunMode;
use async_trait::async_trait;
use std::fmt;

/// Column headers of every result file.
pub const RESULT_HEADER: [&str; 3] = ["Configuration", "Actual Power(dbm)", "Current(mA)"];

/// Measured transmit power, or `INV` where no power applies (idle mode).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerReading {
    /// Average transmit power in dBm
    Measured(f64),
    /// No uplink power is measured
    NotApplicable,
}

impl fmt::Display for PowerReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole values keep their decimal point (`10.0`).
            Self::Measured(dbm) => write!(f, "{:?}", dbm),
            Self::NotApplicable => f.write_str("INV"),
        }
    }
}

/// Averaged current, or a sentinel when the current never settled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurrentReading {
    /// Average current in mA
    Measured(f64),
    /// The stability check timed out
    Unstable,
}

impl fmt::Display for CurrentReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured(ma) => write!(f, "{:?}", ma),
            Self::Unstable => f.write_str("Current unstable"),
        }
    }
}

/// One measured configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Technology under test
    pub technology: Technology,
    /// Connected or standby run
    pub mode: RunMode,
    /// Human-readable configuration, e.g. `@Band:3, DLCH:1575, BW:10MHz, Power:0 dbm`
    pub configuration: String,
    /// Uplink power
    pub power: PowerReading,
    /// Current draw
    pub current: CurrentReading,
}

impl ResultRecord {
    /// File stem grouping this record, e.g. `LTE` or `GSM_standby`.
    pub fn stem(&self) -> String {
        match self.mode {
            RunMode::Connected => self.technology.label().to_string(),
            RunMode::Standby => format!("{}_standby", self.technology.label()),
        }
    }

    /// The three result columns as text.
    pub fn columns(&self) -> [String; 3] {
        [
            self.configuration.clone(),
            self.power.to_string(),
            self.current.to_string(),
        ]
    }
}

/// Destination of result records.
#[async_trait]
pub trait ResultSink: Send {
    /// Store one record.
    async fn record(&mut self, record: ResultRecord) -> AppResult<()>;

    /// Persist everything recorded so far.
    async fn flush(&mut self) -> AppResult<()>;
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<ResultRecord>,
    flushes: usize,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far.
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Number of flushes requested.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record(&mut self, record: ResultRecord) -> AppResult<()> {
        self.records.push(record);
        Ok(())
    }

    async fn flush(&mut self) -> AppResult<()> {
        self.flushes += 1;
        Ok(())
    }
}

// ============================================================================
// CSV Recorder
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use std::collections::hash_map::Entry;
    use std::collections::HashMap;
    use std::fs::{File, OpenOptions};
    use std::path::{Path, PathBuf};
    use tracing::info;

    /// Tab-separated result files, one per [`ResultRecord::stem`].
    pub struct CsvRecorder {
        dir: PathBuf,
        writers: HashMap<String, csv::Writer<File>>,
    }

    impl CsvRecorder {
        /// Write result files into `dir`, creating it if needed.
        pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
            let dir = dir.into();
            std::fs::create_dir_all(&dir)?;
            info!("CSV recorder writing to '{}'", dir.display());
            Ok(Self {
                dir,
                writers: HashMap::new(),
            })
        }

        /// Write result files into a `<yyyymmdd_HHMMSS>` folder below `base`.
        pub fn timestamped(base: &Path) -> AppResult<Self> {
            let folder = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            Self::new(base.join(folder))
        }

        /// Directory receiving the files.
        pub fn dir(&self) -> &Path {
            &self.dir
        }

        /// Path of the file for `stem`.
        pub fn path_for(&self, stem: &str) -> PathBuf {
            self.dir.join(format!("{}.txt", stem))
        }

        fn writer(&mut self, stem: &str) -> AppResult<&mut csv::Writer<File>> {
            let path = self.path_for(stem);
            match self.writers.entry(stem.to_string()) {
                Entry::Occupied(entry) => Ok(entry.into_mut()),
                Entry::Vacant(entry) => {
                    let fresh = !path.exists();
                    let file = OpenOptions::new().create(true).append(true).open(&path)?;
                    let mut writer = csv::WriterBuilder::new()
                        .delimiter(b'\t')
                        .quote_style(csv::QuoteStyle::Never)
                        .has_headers(false)
                        .from_writer(file);
                    if fresh {
                        writer.write_record(RESULT_HEADER)?;
                    }
                    Ok(entry.insert(writer))
                }
            }
        }
    }

    #[async_trait]
    impl ResultSink for CsvRecorder {
        async fn record(&mut self, record: ResultRecord) -> AppResult<()> {
            let writer = self.writer(&record.stem())?;
            writer.write_record(record.columns())?;
            // Each line is on disk before the next measurement starts.
            writer.flush()?;
            Ok(())
        }

        async fn flush(&mut self) -> AppResult<()> {
            for writer in self.writers.values_mut() {
                writer.flush()?;
            }
            info!("CSV recorder flushed {} file(s)", self.writers.len());
            Ok(())
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::BenchError;
    use std::path::{Path, PathBuf};

    /// Placeholder; enable the `storage_csv` feature for result files.
    pub struct CsvRecorder;

    impl CsvRecorder {
        /// Always fails without `storage_csv`.
        pub fn new(_dir: impl Into<PathBuf>) -> AppResult<Self> {
            Err(BenchError::FeatureNotEnabled("storage_csv".to_string()))
        }

        /// Always fails without `storage_csv`.
        pub fn timestamped(_base: &Path) -> AppResult<Self> {
            Err(BenchError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    #[async_trait]
    impl ResultSink for CsvRecorder {
        async fn record(&mut self, _record: ResultRecord) -> AppResult<()> {
            Err(BenchError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn flush(&mut self) -> AppResult<()> {
            Err(BenchError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvRecorder;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvRecorder;
