use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoakZone {
    Bed,
    Extruder,
    Chamber,
}

impl SoakZone {
    pub const ALL: [SoakZone; 3] = [SoakZone::Bed, SoakZone::Extruder, SoakZone::Chamber];

    /// Linear soak rate: milliseconds of soak per degree of rise.
    pub fn ms_per_degree(self) -> f64 {
        match self {
            SoakZone::Bed => 16000.0,
            SoakZone::Extruder => 500.0,
            SoakZone::Chamber => 10000.0,
        }
    }

    /// Seconds to soak a rise of `diff` degrees.
    pub fn estimate_sec(self, diff: f64) -> f64 {
        diff * self.ms_per_degree() / 1000.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SoakZone::Bed => "bed",
            SoakZone::Extruder => "extruder",
            SoakZone::Chamber => "chamber",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SoakZone::Bed => 0,
            SoakZone::Extruder => 1,
            SoakZone::Chamber => 2,
        }
    }
}

impl fmt::Display for SoakZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoakZone {
    type Err = super::SoakError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bed" => Ok(SoakZone::Bed),
            "extruder" => Ok(SoakZone::Extruder),
            "chamber" => Ok(SoakZone::Chamber),
            _ => Err(super::SoakError::UnknownZone(s.to_string())),
        }
    }
}
