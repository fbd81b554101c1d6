//! Rover side: link datagrams back to the correction stream.
use std::io::Write;

use hifitime::prelude::Epoch;
use log::{debug, error, info, warn};

use crate::{
    audit::{AuditLog, Event, Record},
    link::{Datagram, Received},
    utils::{audit_timestamp, to_hex},
};

/// Link quality counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LinkStats {
    /// Correction packets forwarded
    pub corrections: u64,
    /// Correction bytes forwarded
    pub bytes: u64,
    /// Correction packets dropped (length mismatch)
    pub malformed: u64,
    /// Beacons and unknown traffic
    pub other: u64,
    /// Sequence discontinuities
    pub gaps: u64,
}

pub struct Depacketizer<R: Write, C: Write, J: Write> {
    /// Local receiver input
    receiver: R,
    /// Correction log, consumed by the RTK worker
    corrections: C,
    audit: AuditLog<J>,
    last_seq: Option<u8>,
    stats: LinkStats,
}

impl<R: Write, C: Write, J: Write> Depacketizer<R, C, J> {
    pub fn new(receiver: R, corrections: C, audit: AuditLog<J>) -> Self {
        Self {
            receiver,
            corrections,
            audit,
            last_seq: None,
            stats: LinkStats::default(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Handles one datagram: corrections are forwarded to the receiver and
    /// logged, everything else is only journaled.
    pub fn handle(&mut self, now: Epoch, datagram: &Datagram) -> Received {
        let received = Received::classify(&datagram.bytes);
        let ts = audit_timestamp(now);
        let rssi = datagram.rssi.map(|v| v.to_string()).unwrap_or_default();
        let snr = datagram.snr.map(|v| v.to_string()).unwrap_or_default();

        let (event, seq, detail) = match &received {
            Received::Correction(packet) => {
                self.track_sequence(packet.seq);
                self.forward(&packet.payload);

                self.stats.corrections += 1;
                self.stats.bytes += packet.payload.len() as u64;

                info!(
                    "[{}] Rx CORR seq={} len={} RSSI={}dBm SNR={}",
                    ts,
                    packet.seq,
                    packet.payload.len(),
                    rssi,
                    snr
                );

                (Event::CorrOk, Some(packet.seq), to_hex(&packet.payload))
            },
            Received::Malformed {
                seq,
                declared,
                actual,
            } => {
                self.stats.malformed += 1;

                warn!(
                    "[{}] Rx CORR seq={} dropped: declared {} bytes, got {}",
                    ts, seq, declared, actual
                );

                (Event::CorrBadLen, Some(*seq), to_hex(&datagram.bytes))
            },
            Received::Other => {
                self.stats.other += 1;

                let detail = match std::str::from_utf8(&datagram.bytes) {
                    Ok(text) => text.to_string(),
                    Err(_) => to_hex(&datagram.bytes),
                };

                info!("[{}] Rx {} RSSI={}dBm SNR={}", ts, detail, rssi, snr);
                (Event::RxOther, None, detail)
            },
        };

        let record = Record::new(now, event, seq, datagram.bytes.len(), &detail)
            .with_signal(datagram.rssi, datagram.snr);

        if let Err(e) = self.audit.record(&record) {
            error!("link journal: {}", e);
        }

        received
    }

    fn track_sequence(&mut self, seq: u8) {
        if let Some(last) = self.last_seq {
            let expected = last.wrapping_add(1);
            if seq != expected {
                self.stats.gaps += 1;
                debug!("sequence gap: expected {}, got {}", expected, seq);
            }
        }
        self.last_seq = Some(seq);
    }

    fn forward(&mut self, payload: &[u8]) {
        if let Err(e) = self.receiver.write_all(payload) {
            error!("failed to forward corrections to receiver: {}", e);
        }

        // synchronous: the RTK worker reads this file concurrently
        if let Err(e) = self
            .corrections
            .write_all(payload)
            .and_then(|_| self.corrections.flush())
        {
            error!("correction log: {}", e);
        }
    }

    /// Flushes every log (shutdown).
    pub fn close(mut self) -> R {
        if let Err(e) = self.corrections.flush() {
            error!("correction log: {}", e);
        }
        if let Err(e) = self.audit.flush() {
            error!("link journal: {}", e);
        }
        self.receiver
    }
}
