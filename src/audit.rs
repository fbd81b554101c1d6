//! Link audit journal (CSV), one line per link event, flushed per line.
use std::{
    fmt::Display,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use hifitime::prelude::Epoch;

use crate::{
    error::{Error, Result},
    settings::Sink,
    utils::audit_timestamp,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// Correction packet transmitted
    TxCorr,
    /// Beacon transmitted
    TxBeacon,
    /// Transmission failed, packet lost
    TxFail,
    /// Correction packet received and forwarded
    CorrOk,
    /// Correction packet with inconsistent length, dropped
    CorrBadLen,
    /// Beacon or unknown traffic received
    RxOther,
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TxCorr => write!(f, "TX_CORR"),
            Self::TxBeacon => write!(f, "TX_BEACON"),
            Self::TxFail => write!(f, "TX_FAIL"),
            Self::CorrOk => write!(f, "CORR_OK"),
            Self::CorrBadLen => write!(f, "CORR_BADLEN"),
            Self::RxOther => write!(f, "RX_OTHER"),
        }
    }
}

/// One journal line
#[derive(Debug, Clone)]
pub struct Record<'a> {
    pub epoch: Epoch,
    pub event: Event,
    pub seq: Option<u8>,
    pub len: usize,
    pub rssi: Option<i16>,
    pub snr: Option<f32>,
    pub detail: &'a str,
}

impl<'a> Record<'a> {
    pub fn new(epoch: Epoch, event: Event, seq: Option<u8>, len: usize, detail: &'a str) -> Self {
        Self {
            epoch,
            event,
            seq,
            len,
            detail,
            rssi: None,
            snr: None,
        }
    }

    pub fn with_signal(mut self, rssi: Option<i16>, snr: Option<f32>) -> Self {
        self.rssi = rssi;
        self.snr = snr;
        self
    }
}

fn opt<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub struct AuditLog<W: Write> {
    w: W,
    /// Transmit side has no signal metrics
    signal: bool,
}

impl AuditLog<Sink> {
    /// Creates (truncates) a journal file
    pub fn create(path: &Path, signal: bool) -> Result<Self> {
        let fd = File::create(path).map_err(|e| Error::file(path, e))?;
        Self::new(Box::new(BufWriter::new(fd)), signal).map_err(|e| Error::file(path, e))
    }
}

impl<W: Write> AuditLog<W> {
    /// Writes the column header
    pub fn new(mut w: W, signal: bool) -> std::io::Result<Self> {
        if signal {
            writeln!(w, "TIMESTAMP,EVENT,SEQ,LEN,RSSI,SNR,DETAIL")?;
        } else {
            writeln!(w, "TIMESTAMP,EVENT,SEQ,LEN,DETAIL")?;
        }
        w.flush()?;
        Ok(Self { w, signal })
    }

    pub fn record(&mut self, rec: &Record) -> std::io::Result<()> {
        // keep one event per line
        let detail = rec.detail.replace(['\r', '\n'], " ");

        if self.signal {
            writeln!(
                self.w,
                "{},{},{},{},{},{},{}",
                audit_timestamp(rec.epoch),
                rec.event,
                opt(rec.seq),
                rec.len,
                opt(rec.rssi),
                opt(rec.snr),
                detail
            )?;
        } else {
            writeln!(
                self.w,
                "{},{},{},{},{}",
                audit_timestamp(rec.epoch),
                rec.event,
                opt(rec.seq),
                rec.len,
                detail
            )?;
        }

        self.w.flush()
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.w.flush()
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.w
    }
}
