//! NMEA telemetry from the local receiver.
//!
//! Parsing never fails loudly: a sentence that cannot be understood
//! simply yields nothing.
use crate::fix::PositionFix;

/// Understood sentences
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sentence {
    /// Position and fix quality (GGA)
    Position(PositionFix),
    /// Position dilution of precision (GSA)
    Precision(f64),
}

impl Sentence {
    pub fn parse(line: &str) -> Option<Self> {
        if line.contains("GGA") {
            parse_gga(line).map(Self::Position)
        } else if line.contains("GSA") {
            parse_gsa(line).map(Self::Precision)
        } else {
            None
        }
    }
}

/// `ddmm.mmmm` (latitude) or `dddmm.mmmm` (longitude) to decimal degrees.
pub fn to_degrees(raw: &str, hemisphere: &str, is_latitude: bool) -> Option<f64> {
    let degrees_len = if is_latitude { 2 } else { 3 };

    if raw.len() <= degrees_len || !raw.is_char_boundary(degrees_len) {
        return None;
    }

    let (degrees, minutes) = raw.split_at(degrees_len);
    let degrees = degrees.parse::<u16>().ok()? as f64;
    let minutes = minutes.parse::<f64>().ok()?;

    let value = degrees + minutes / 60.0;

    match hemisphere {
        "S" | "W" => Some(-value),
        _ => Some(value),
    }
}

/// Position from a GGA sentence. Coordinates are mandatory, missing or
/// invalid fix quality and satellite count read as zero.
pub fn parse_gga(line: &str) -> Option<PositionFix> {
    if !line.contains("GGA") {
        return None;
    }

    let fields = line.split(',').collect::<Vec<_>>();
    if fields.len() < 9 {
        return None;
    }

    let latitude = to_degrees(fields[2], fields[3], true)?;
    let longitude = to_degrees(fields[4], fields[5], false)?;

    Some(PositionFix {
        latitude,
        longitude,
        quality: fields[6].parse().unwrap_or(0),
        satellites: fields[7].parse().unwrap_or(0),
        dop: fields[8].parse().ok(),
    })
}

/// PDOP from a GSA sentence (field following the 12 satellite slots).
///
/// Fields count from the sentence tag: 1 mode, 2 fix type, 3..=14 the
/// satellite slots, 15 PDOP, 16 HDOP, 17 VDOP. Index 14 is the last
/// satellite slot, not a precision value.
pub fn parse_gsa(line: &str) -> Option<f64> {
    if !line.contains("GSA") {
        return None;
    }

    let fields = line.split(',').collect::<Vec<_>>();
    fields.get(15)?.parse().ok()
}

/// Splits receiver output into text lines. Binary content is decoded
/// lossily and mostly ends up in lines no parser recognizes.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    /// Appends raw bytes, returns every completed (trimmed, non empty) line.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(data));

        let mut lines = Vec::new();

        while let Some(end) = self.buf.find('\n') {
            let line = self.buf.drain(..=end).collect::<String>();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        lines
    }
}
