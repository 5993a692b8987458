use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::GetDataError;

/// Slew and settle overhead paid once by the first frame of a group.
const FIRST_FRAME_OVERHEAD_1M0: f64 = 90.0;
const FIRST_FRAME_OVERHEAD_2M0: f64 = 240.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ApertureClass {
    #[serde(rename = "1m0")]
    OneMeter,
    #[serde(rename = "2m0")]
    TwoMeter,
}

impl ApertureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMeter => "1m0",
            Self::TwoMeter => "2m0",
        }
    }
}

impl fmt::Display for ApertureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApertureClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m0" => Ok(Self::OneMeter),
            "2m0" => Ok(Self::TwoMeter),
            other => Err(format!("unknown aperture class `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentFamily {
    /// Sinistro cameras on the 1m network.
    Fl,
    /// SBIG cameras.
    Kb,
    /// Spectral cameras on the 2m telescopes.
    Fs,
}

impl InstrumentFamily {
    pub fn from_instrument(code: &str) -> Option<Self> {
        let prefix: String = code.chars().take(2).collect();
        match prefix.as_str() {
            "fl" => Some(Self::Fl),
            "kb" => Some(Self::Kb),
            "fs" => Some(Self::Fs),
            _ => None,
        }
    }

    pub fn aperture(self) -> ApertureClass {
        match self {
            Self::Fs => ApertureClass::TwoMeter,
            Self::Fl | Self::Kb => ApertureClass::OneMeter,
        }
    }

    /// Per-frame terms: setup, readout, settle.
    fn frame_terms(self) -> [f64; 3] {
        match self {
            Self::Fl => [2.0, 37.0, 1.0],
            Self::Kb => [2.0, 14.5, 1.0],
            Self::Fs => [2.0, 10.5, 12.0],
        }
    }

    fn slew(self) -> f64 {
        match self.aperture() {
            ApertureClass::OneMeter => FIRST_FRAME_OVERHEAD_1M0,
            ApertureClass::TwoMeter => FIRST_FRAME_OVERHEAD_2M0,
        }
    }

    // Summed left to right onto the exposure, the order existing ledgers were
    // written with.
    fn charge(self, exposure_secs: f64, first_in_group: bool) -> f64 {
        let mut total = exposure_secs;
        if first_in_group {
            total += self.slew();
        }
        for term in self.frame_terms() {
            total += term;
        }
        total
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCost {
    pub seconds: f64,
    pub aperture: ApertureClass,
}

pub fn cost(
    instrument: &str,
    exposure_secs: f64,
    first_in_group: bool,
) -> Result<TimeCost, GetDataError> {
    let family = InstrumentFamily::from_instrument(instrument).ok_or_else(|| {
        GetDataError::UnknownInstrumentClass {
            instrument: instrument.to_string(),
        }
    })?;
    Ok(TimeCost {
        seconds: family.charge(exposure_secs, first_in_group),
        aperture: family.aperture(),
    })
}
