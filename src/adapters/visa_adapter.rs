//! VISA command channel for LAN/GPIB instruments
//!
//! Provides a [`CommandChannel`] implementation for the VISA communication protocol,
//! used for both the radio tester (`TCPIP0::<ip>::inst0::INSTR`) and the DC source
//! (`GPIB0::<addr>::INSTR`).

use super::CommandChannel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use anyhow::Context;
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// Default response timeout, matching the instruments' slowest configuration commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// VISA channel
///
/// Wraps the visa-rs crate and runs the synchronous VISA I/O on Tokio's
/// blocking executor. The read terminator (`\n`) is stripped from replies.
///
/// Supports resource strings like:
/// - "TCPIP0::192.168.2.10::inst0::INSTR" (LAN / VXI-11)
/// - "GPIB0::15::INSTR" (GPIB)
pub struct VisaChannel {
    /// VISA resource string
    pub(crate) resource_string: String,

    /// Response timeout
    pub(crate) timeout: Duration,

    /// Line terminator appended to commands
    pub(crate) line_terminator: String,

    #[cfg(feature = "instrument_visa")]
    instrument: Arc<Mutex<Instrument>>,
}

impl VisaChannel {
    /// Open a VISA session to `resource_string`.
    ///
    /// # Errors
    /// Returns an error if the resource manager or the resource cannot be opened,
    /// or if the crate was built without `instrument_visa`.
    #[cfg(feature = "instrument_visa")]
    pub async fn connect(resource_string: &str, timeout: Duration) -> Result<Self> {
        let resource = resource_string.to_string();
        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new()
                .map_err(|e| anyhow!("Failed to create VISA resource manager: {:?}", e))?;
            let c_resource = std::ffi::CString::new(resource.clone())
                .context("Resource string contains a NUL byte")?;
            rm.open(&c_resource.into(), AccessMode::NO_LOCK, timeout)
                .map_err(|e| anyhow!("Failed to open VISA resource '{}': {:?}", resource, e))
        })
        .await
        .context("VISA open task panicked")??;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource_string,
            timeout.as_millis()
        );

        Ok(Self {
            resource_string: resource_string.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
            instrument: Arc::new(Mutex::new(instrument)),
        })
    }

    /// Always fails: the crate was built without `instrument_visa`.
    #[cfg(not(feature = "instrument_visa"))]
    pub async fn connect(resource_string: &str, _timeout: Duration) -> Result<Self> {
        Err(anyhow!(
            "Cannot open '{}': VISA support not enabled. Rebuild with --features instrument_visa",
            resource_string
        ))
    }

    #[cfg(feature = "instrument_visa")]
    async fn exchange(&self, command: &str, read_reply: bool) -> Result<String> {
        use std::io::{BufRead, BufReader, Write};

        let framed = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();
        let instrument = self.instrument.clone();

        tokio::task::spawn_blocking(move || {
            let mut instr = instrument
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;
            instr
                .write_all(framed.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", command_for_log))?;
            if !read_reply {
                debug!("VISA command sent: {}", command_for_log);
                return Ok(String::new());
            }
            let mut reply = String::new();
            BufReader::new(&*instr)
                .read_line(&mut reply)
                .with_context(|| format!("VISA read failed for: {}", command_for_log))?;
            let reply = reply.trim_end_matches(['\r', '\n']).to_string();
            debug!("VISA query '{}' -> '{}'", command_for_log, reply);
            Ok(reply)
        })
        .await
        .context("VISA I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn exchange(&self, _command: &str, _read_reply: bool) -> Result<String> {
        Err(anyhow!(
            "VISA support not enabled. Rebuild with --features instrument_visa"
        ))
    }
}

#[async_trait]
impl CommandChannel for VisaChannel {
    async fn send(&self, command: &str) -> Result<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    async fn query(&self, command: &str) -> Result<String> {
        self.exchange(command, true).await
    }

    fn describe(&self) -> String {
        format!(
            "VisaChannel({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(all(test, not(feature = "instrument_visa")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_visa_feature_fails() {
        let result = VisaChannel::connect("TCPIP0::192.168.2.10::inst0::INSTR", DEFAULT_TIMEOUT).await;
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("instrument_visa"));
        assert!(err.contains("TCPIP0::192.168.2.10"));
    }
}
