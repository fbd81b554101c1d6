//! Base side: correction stream to link packets, plus the liveness beacon.
use std::io::Write;

use bytes::BytesMut;
use hifitime::prelude::Epoch;
use log::{error, info};

use crate::{
    audit::{AuditLog, Event, Record},
    clock::Ticker,
    link::{BEACON, LinkPacket, MAX_PAYLOAD, Transport},
    settings::LinkSettings,
    utils::{audit_timestamp, to_hex},
};

pub struct Packetizer<T: Transport, W: Write> {
    transport: T,
    audit: AuditLog<W>,

    /// Pending correction bytes. Unbounded: there is no flow control
    /// towards the reference receiver.
    queue: BytesMut,

    /// Next sequence number
    seq: u8,

    max_payload: usize,
    flush: Ticker,
    beacon: Ticker,
}

impl<T: Transport, W: Write> Packetizer<T, W> {
    pub fn new(transport: T, audit: AuditLog<W>, settings: &LinkSettings) -> Self {
        Self {
            transport,
            audit,
            seq: 0,
            queue: BytesMut::with_capacity(4 * MAX_PAYLOAD),
            max_payload: settings.max_payload.clamp(1, MAX_PAYLOAD),
            flush: Ticker::new(settings.flush_interval),
            beacon: Ticker::new(settings.beacon_interval),
        }
    }

    /// Queues correction bytes for transmission
    pub fn enqueue(&mut self, data: &[u8]) {
        self.queue.extend_from_slice(data);
    }

    /// Bytes waiting for transmission
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Sequence number of the next packet
    #[cfg(test)]
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// Drains the queue into packets while a full packet is available or
    /// the flush latency expired. A short tail left after a flush waits
    /// for the next latency window. Returns the number of packets sent.
    pub fn poll(&mut self, now: Epoch) -> usize {
        let mut sent = 0;

        while !self.queue.is_empty()
            && (self.queue.len() >= self.max_payload || self.flush.is_due(now))
        {
            let size = self.max_payload.min(self.queue.len());

            let packet = LinkPacket {
                seq: self.seq,
                payload: self.queue.split_to(size).freeze(),
            };

            self.transmit(now, &packet);

            self.seq = self.seq.wrapping_add(1);
            self.flush.mark(now);
            sent += 1;
        }

        sent
    }

    fn transmit(&mut self, now: Epoch, packet: &LinkPacket) {
        let len = packet.payload.len();

        let (event, detail) = match self.transport.send(&packet.encode()) {
            Ok(_) => {
                info!(
                    "[{}] Tx CORR seq={} bytes={}",
                    audit_timestamp(now),
                    packet.seq,
                    len
                );
                (Event::TxCorr, to_hex(&packet.payload))
            },
            Err(e) => {
                // best effort: the chunk is lost
                error!(
                    "[{}] Tx CORR seq={} failed: {}",
                    audit_timestamp(now),
                    packet.seq,
                    e
                );
                (Event::TxFail, e.to_string())
            },
        };

        self.journal(&Record::new(now, event, Some(packet.seq), len, &detail));
    }

    /// Emits the beacon when its period elapsed, regardless of traffic.
    /// Returns true when a beacon was sent.
    pub fn poll_beacon(&mut self, now: Epoch) -> bool {
        if !self.beacon.is_due(now) {
            return false;
        }

        self.beacon.mark(now);

        match self.transport.send(BEACON) {
            Ok(_) => {
                info!("[{}] Tx Beacon", audit_timestamp(now));
                let detail = String::from_utf8_lossy(BEACON);
                let record = Record::new(now, Event::TxBeacon, Some(self.seq), 0, &detail);
                self.journal(&record);
                true
            },
            Err(e) => {
                error!("[{}] Tx Beacon failed: {}", audit_timestamp(now), e);
                let detail = e.to_string();
                let record = Record::new(now, Event::TxFail, Some(self.seq), 0, &detail);
                self.journal(&record);
                false
            },
        }
    }

    fn journal(&mut self, record: &Record) {
        if let Err(e) = self.audit.record(record) {
            error!("link journal: {}", e);
        }
    }

    /// Flushes the journal, returns the transport (shutdown).
    pub fn close(mut self) -> T {
        if let Err(e) = self.audit.flush() {
            error!("link journal: {}", e);
        }
        self.transport
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
