//! Closed enumerations for instrument codes.
//!
//! Each enumeration is backed by one explicit table mapping the operator-facing key
//! (e.g. `"DCS1800"`, `"10"`) to the instrument's code (e.g. `G18`, `B100`). Unknown
//! keys are rejected with [`BenchError::UnknownCode`] before anything is sent.

use crate::error::{AppResult, BenchError};
use std::fmt;
use std::str::FromStr;

/// GSM frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GsmBand {
    /// GSM 850
    Gsm850,
    /// E-GSM 900
    Gsm900,
    /// DCS 1800
    Dcs1800,
    /// PCS 1900
    Pcs1900,
}

/// (band, key, band symbol, band indicator)
const GSM_BAND_TABLE: [(GsmBand, &str, &str, Option<&str>); 4] = [
    (GsmBand::Gsm850, "GSM850", "G085", None),
    (GsmBand::Gsm900, "GSM900", "G09", None),
    (GsmBand::Dcs1800, "DCS1800", "G18", Some("G18")),
    (GsmBand::Pcs1900, "PCS1900", "G19", Some("G19")),
];

impl GsmBand {
    /// All bands in table order.
    pub const ALL: [GsmBand; 4] = [
        GsmBand::Gsm850,
        GsmBand::Gsm900,
        GsmBand::Dcs1800,
        GsmBand::Pcs1900,
    ];

    fn row(self) -> (GsmBand, &'static str, &'static str, Option<&'static str>) {
        // The table is indexed by discriminant.
        GSM_BAND_TABLE[self as usize]
    }

    /// Operator-facing name, e.g. `DCS1800`.
    pub fn name(self) -> &'static str {
        self.row().1
    }

    /// Instrument band symbol, e.g. `G18`.
    pub fn symbol(self) -> &'static str {
        self.row().2
    }

    /// Band indicator the cell must broadcast before a handover into this band.
    ///
    /// `None` for the bands that need no indicator.
    pub fn band_indicator(self) -> Option<&'static str> {
        self.row().3
    }

    /// Traffic-channel power control level used for the maximum-power measurement.
    pub fn max_power_pcl(self) -> &'static str {
        match self {
            GsmBand::Dcs1800 | GsmBand::Pcs1900 => "0",
            GsmBand::Gsm850 | GsmBand::Gsm900 => "5",
        }
    }

    /// Look up a band from the instrument's symbol.
    pub fn from_symbol(symbol: &str) -> AppResult<Self> {
        let symbol = symbol.trim();
        GSM_BAND_TABLE
            .iter()
            .find(|row| row.2 == symbol)
            .map(|row| row.0)
            .ok_or_else(|| BenchError::UnknownCode {
                kind: "GSM band symbol",
                value: symbol.to_string(),
            })
    }
}

impl FromStr for GsmBand {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        GSM_BAND_TABLE
            .iter()
            .find(|row| row.1.eq_ignore_ascii_case(key))
            .map(|row| row.0)
            .ok_or_else(|| BenchError::UnknownCode {
                kind: "GSM band",
                value: key.to_string(),
            })
    }
}

impl fmt::Display for GsmBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LTE downlink channel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LteBandwidth {
    /// 1.4 MHz
    Mhz1_4,
    /// 3 MHz
    Mhz3,
    /// 5 MHz
    Mhz5,
    /// 10 MHz
    Mhz10,
    /// 15 MHz
    Mhz15,
    /// 20 MHz
    Mhz20,
}

/// (bandwidth, MHz key, instrument code)
const LTE_BANDWIDTH_TABLE: [(LteBandwidth, &str, &str); 6] = [
    (LteBandwidth::Mhz1_4, "1.4", "B014"),
    (LteBandwidth::Mhz3, "3", "B030"),
    (LteBandwidth::Mhz5, "5", "B050"),
    (LteBandwidth::Mhz10, "10", "B100"),
    (LteBandwidth::Mhz15, "15", "B150"),
    (LteBandwidth::Mhz20, "20", "B200"),
];

impl LteBandwidth {
    /// Bandwidth in MHz as the operator writes it, e.g. `"10"`.
    pub fn mhz(self) -> &'static str {
        LTE_BANDWIDTH_TABLE[self as usize].1
    }

    /// Instrument code, e.g. `B100`.
    pub fn code(self) -> &'static str {
        LTE_BANDWIDTH_TABLE[self as usize].2
    }

    /// Look up a bandwidth from the instrument's code.
    pub fn from_code(code: &str) -> AppResult<Self> {
        let code = code.trim();
        LTE_BANDWIDTH_TABLE
            .iter()
            .find(|row| row.2 == code)
            .map(|row| row.0)
            .ok_or_else(|| BenchError::UnknownCode {
                kind: "LTE bandwidth code",
                value: code.to_string(),
            })
    }
}

impl FromStr for LteBandwidth {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().trim_end_matches("MHz");
        LTE_BANDWIDTH_TABLE
            .iter()
            .find(|row| row.1 == key)
            .map(|row| row.0)
            .ok_or_else(|| BenchError::UnknownCode {
                kind: "LTE bandwidth",
                value: s.trim().to_string(),
            })
    }
}

impl fmt::Display for LteBandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz", self.mhz())
    }
}

/// LTE default paging cycle, in radio frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PagingCycle {
    /// 32 frames
    Rf32,
    /// 64 frames
    Rf64,
    /// 128 frames
    #[default]
    Rf128,
    /// 256 frames
    Rf256,
}

/// (cycle, frame key, instrument code)
const PAGING_CYCLE_TABLE: [(PagingCycle, &str, &str); 4] = [
    (PagingCycle::Rf32, "32", "P032"),
    (PagingCycle::Rf64, "64", "P064"),
    (PagingCycle::Rf128, "128", "P128"),
    (PagingCycle::Rf256, "256", "P256"),
];

impl PagingCycle {
    /// Frames as the operator writes them, e.g. `"128"`.
    pub fn frames(self) -> &'static str {
        PAGING_CYCLE_TABLE[self as usize].1
    }

    /// Instrument code, e.g. `P128`.
    pub fn code(self) -> &'static str {
        PAGING_CYCLE_TABLE[self as usize].2
    }
}

impl FromStr for PagingCycle {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        PAGING_CYCLE_TABLE
            .iter()
            .find(|row| row.1 == key)
            .map(|row| row.0)
            .ok_or_else(|| BenchError::UnknownCode {
                kind: "paging cycle",
                value: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_are_indexed_by_discriminant() {
        for (i, row) in GSM_BAND_TABLE.iter().enumerate() {
            assert_eq!(row.0 as usize, i);
        }
        for (i, row) in LTE_BANDWIDTH_TABLE.iter().enumerate() {
            assert_eq!(row.0 as usize, i);
        }
        for (i, row) in PAGING_CYCLE_TABLE.iter().enumerate() {
            assert_eq!(row.0 as usize, i);
        }
    }

    #[test]
    fn test_codes_are_unique() {
        let symbols: HashSet<_> = GSM_BAND_TABLE.iter().map(|r| r.2).collect();
        assert_eq!(symbols.len(), GSM_BAND_TABLE.len());
        let codes: HashSet<_> = LTE_BANDWIDTH_TABLE.iter().map(|r| r.2).collect();
        assert_eq!(codes.len(), LTE_BANDWIDTH_TABLE.len());
        let codes: HashSet<_> = PAGING_CYCLE_TABLE.iter().map(|r| r.2).collect();
        assert_eq!(codes.len(), PAGING_CYCLE_TABLE.len());
    }

    #[test]
    fn test_gsm_band_lookup() {
        let band: GsmBand = "DCS1800".parse().unwrap();
        assert_eq!(band, GsmBand::Dcs1800);
        assert_eq!(band.symbol(), "G18");
        assert_eq!(band.band_indicator(), Some("G18"));
        assert_eq!(GsmBand::from_symbol("G085\n").unwrap(), GsmBand::Gsm850);
        assert_eq!(GsmBand::Gsm900.band_indicator(), None);
        assert_eq!(GsmBand::Pcs1900.max_power_pcl(), "0");
        assert_eq!(GsmBand::Gsm850.max_power_pcl(), "5");
    }

    #[test]
    fn test_unknown_keys_are_typed_errors() {
        assert!(matches!(
            "GSM1800".parse::<GsmBand>(),
            Err(BenchError::UnknownCode { kind: "GSM band", .. })
        ));
        assert!(matches!(
            "7".parse::<LteBandwidth>(),
            Err(BenchError::UnknownCode { kind: "LTE bandwidth", .. })
        ));
        assert!(matches!(
            "100".parse::<PagingCycle>(),
            Err(BenchError::UnknownCode { .. })
        ));
    }

    #[test]
    fn test_lte_bandwidth_round_trip_through_codes() {
        let bw: LteBandwidth = "1.4".parse().unwrap();
        assert_eq!(bw.code(), "B014");
        assert_eq!(LteBandwidth::from_code("B100").unwrap().mhz(), "10");
        assert_eq!("20MHz".parse::<LteBandwidth>().unwrap(), LteBandwidth::Mhz20);
        assert_eq!(PagingCycle::default().code(), "P128");
    }
}
