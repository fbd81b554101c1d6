use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use hifitime::prelude::{Duration, Epoch};

use crate::{
    error::{Error, Result},
    link::MAX_PAYLOAD,
    utils::session_stamp,
};

/// Log (or receiver) output
pub type Sink = Box<dyn Write + Send>;

/// Creates (truncates) a buffered log file, and its parent directory
pub fn create_log(path: &Path) -> Result<Sink> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
    }

    let fd = File::create(path).map_err(|e| Error::file(path, e))?;
    Ok(Box::new(BufWriter::new(fd)))
}

/// Files produced during one session
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// Everything the reference receiver produced
    BaseRaw,
    /// Base link journal
    BaseAudit,
    /// Everything the rover receiver produced
    RoverRaw,
    /// Corrections received over the link
    RoverCorrections,
    /// Rover link journal
    RoverAudit,
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Custom directory prefix
    pub prefix: Option<PathBuf>,
}

impl LogSettings {
    /// Session file name, stamped with the session start time (HHMM)
    pub fn filename(&self, kind: LogKind, t: Epoch) -> PathBuf {
        let stamp = session_stamp(t);

        let name = match kind {
            LogKind::BaseRaw => format!("base_gps_{}.ubx", stamp),
            LogKind::BaseAudit => format!("base_lora_{}.csv", stamp),
            LogKind::RoverRaw => format!("rover_gps_{}.ubx", stamp),
            LogKind::RoverCorrections => format!("rover_corr_{}.bin", stamp),
            LogKind::RoverAudit => format!("rover_lora_{}.csv", stamp),
        };

        match &self.prefix {
            Some(prefix) => prefix.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Correction link settings (base side)
#[derive(Debug, Copy, Clone)]
pub struct LinkSettings {
    /// Largest payload per packet, at most [MAX_PAYLOAD]
    pub max_payload: usize,

    /// Maximal latency before a partial packet is flushed
    pub flush_interval: Duration,

    /// Beacon period
    pub beacon_interval: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
            flush_interval: Duration::from_milliseconds(250.0),
            beacon_interval: Duration::from_seconds(5.0),
        }
    }
}
