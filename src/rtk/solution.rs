//! RTKLIB solution (`.pos`) files.
use std::{io::ErrorKind, path::Path};

use crate::{
    error::{Error, Result},
    fix::{PositionFix, quality},
};

/// RTKLIB solution quality flags
pub mod q {
    pub const FIX: u8 = 1;
    pub const FLOAT: u8 = 2;
    #[cfg(test)]
    pub const SBAS: u8 = 3;
    #[cfg(test)]
    pub const DGPS: u8 = 4;
    #[cfg(test)]
    pub const SINGLE: u8 = 5;
    #[cfg(test)]
    pub const PPP: u8 = 6;
}

/// Latest solved epoch
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Solution {
    /// Position, quality already mapped to the published scale
    pub fix: PositionFix,
    /// Quality as reported by the engine
    pub solver_quality: u8,
}

/// Engine quality to published quality
pub fn map_quality(solver_quality: u8) -> u8 {
    match solver_quality {
        q::FIX => quality::RTK_FIXED,
        q::FLOAT => quality::RTK_FLOAT,
        _ => quality::SINGLE,
    }
}

fn parse_line(line: &str) -> Option<Solution> {
    let cols = line.split_whitespace().collect::<Vec<_>>();
    if cols.len() < 7 {
        return None;
    }

    let latitude = cols[2].parse::<f64>().ok()?;
    let longitude = cols[3].parse::<f64>().ok()?;
    let solver_quality = cols[5].parse::<u8>().ok()?;
    let satellites = cols[6].parse::<u8>().ok()?;

    Some(Solution {
        fix: PositionFix {
            latitude,
            longitude,
            satellites,
            quality: map_quality(solver_quality),
            dop: None,
        },
        solver_quality,
    })
}

/// Most recent well formed epoch: last data line, comments (`%`) and
/// blank lines skipped.
pub fn parse(content: &str) -> Option<Solution> {
    content
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('%'))
        .find_map(parse_line)
}

/// Reads a solution file. A missing file is no solution.
pub fn read(path: &Path) -> Result<Option<Solution>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse(&content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::file(path, e)),
    }
}
