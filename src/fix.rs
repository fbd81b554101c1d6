/// Fix quality, as published (GGA scale)
pub mod quality {
    pub const INVALID: u8 = 0;
    pub const SINGLE: u8 = 1;
    pub const RTK_FIXED: u8 = 4;
    pub const RTK_FLOAT: u8 = 5;

    /// Trust order of a GGA quality code: fixed > float > differential >
    /// single > invalid. GGA codes do not sort that way (float is 5).
    pub fn rank(quality: u8) -> u8 {
        match quality {
            RTK_FIXED => 5,
            RTK_FLOAT => 4,
            // dgps, pps
            2 | 3 => 3,
            SINGLE => 2,
            // invalid, dead reckoning, manual, simulation
            _ => 0,
        }
    }

    /// True when `quality` is at least as trustworthy as `minimum`
    pub fn meets(quality: u8, minimum: u8) -> bool {
        rank(quality) >= rank(minimum)
    }
}

/// Position solution, either from live receiver telemetry
/// or from the RTK post-processing pipeline.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PositionFix {
    /// Decimal degrees, south negative
    pub latitude: f64,
    /// Decimal degrees, west negative
    pub longitude: f64,
    /// Fix quality, see [quality]
    pub quality: u8,
    /// Satellites used
    pub satellites: u8,
    /// Dilution of precision
    pub dop: Option<f64>,
}

impl std::fmt::Display for PositionFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat={:.7} lon={:.7} fixQ={} sats={}",
            self.latitude, self.longitude, self.quality, self.satellites
        )?;
        if let Some(dop) = self.dop {
            write!(f, " dop={:.1}", dop)?;
        }
        Ok(())
    }
}
