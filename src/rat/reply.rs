//! Measurement reply schemas.
//!
//! Result queries answer with a flat comma-separated list whose meaning is fixed by
//! position. Each measurement type gets a versioned [`ReplySchema`] naming the field
//! that carries the averaged transmit power; the field count is checked before
//! indexing so that a firmware change in the reply layout fails loudly instead of
//! reading the wrong value.

use crate::error::{AppResult, BenchError};
use tracing::warn;

/// Position-based layout of one measurement result reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySchema {
    /// Measurement name used in errors and logs.
    pub name: &'static str,
    /// Layout version; bump when the instrument's reply changes shape.
    pub version: u16,
    /// Minimum number of fields a valid reply carries.
    pub min_fields: usize,
    /// Index of the averaged transmit power (dBm).
    pub power_index: usize,
}

/// `FETCh:GSM:MEAS:MEValuation:PVTime?`: power vs. time, average burst power at 5.
pub const GSM_POWER_VS_TIME: ReplySchema = ReplySchema {
    name: "GSM power vs. time",
    version: 1,
    min_fields: 6,
    power_index: 5,
};

/// `FETCh:WCDMa:MEAS:MEValuation:TRACe:UEPower:AVERage?`: UE power trace, first slot at 1.
pub const WCDMA_UE_POWER: ReplySchema = ReplySchema {
    name: "WCDMA UE power",
    version: 1,
    min_fields: 2,
    power_index: 1,
};

/// `FETCh:LTE:MEAS:MEValuation:MODulation:AVERage?`: averaged modulation result, TX power at 17.
pub const LTE_MODULATION_AVERAGE: ReplySchema = ReplySchema {
    name: "LTE modulation average",
    version: 1,
    min_fields: 18,
    power_index: 17,
};

impl ReplySchema {
    /// Extract the transmit power from `reply`, rounded to two decimals.
    ///
    /// # Errors
    /// - [`BenchError::ReplySchema`] if the reply has fewer than `min_fields` fields
    /// - [`BenchError::ParseReply`] if the power field is not a number
    pub fn extract_power(&self, reply: &str) -> AppResult<f64> {
        let fields: Vec<&str> = reply.trim().split(',').collect();
        if fields.len() < self.min_fields.max(self.power_index + 1) {
            return Err(BenchError::ReplySchema {
                schema: self.name,
                expected: self.min_fields,
                actual: fields.len(),
                reply: reply.to_string(),
            });
        }

        // Field 0 is the reliability indicator; non-zero means the result is suspect.
        if fields[0].trim() != "0" {
            warn!(
                "{} (v{}) reliability indicator is {}",
                self.name,
                self.version,
                fields[0].trim()
            );
        }

        let raw = fields[self.power_index].trim();
        let power: f64 = raw.parse().map_err(|_| {
            BenchError::ParseReply(format!(
                "{} field {} is not a number: '{}'",
                self.name, self.power_index, raw
            ))
        })?;
        Ok(round_to(power, 2))
    }
}

/// Round `value` to `decimals` places, exact halves to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}
