//! Rover role: link corrections into the local receiver, live telemetry.
use std::io::Write;

use hifitime::prelude::{Duration, Epoch};
use log::{error, info, trace};
use tokio::sync::watch;

use crate::{
    clock::{Clock, Ticker},
    device::Device,
    link::{Transport, depacketizer::Depacketizer},
    nmea::{LineBuffer, Sentence},
    runtime::Runtime,
    settings::Sink,
};

/// Pause between two iterations
const IDLE: std::time::Duration = std::time::Duration::from_millis(5);

/// Datagrams handled per iteration at most
const MAX_DATAGRAMS: usize = 16;

pub struct Rover<T: Transport> {
    transport: T,
    depacketizer: Depacketizer<Sink, Sink, Sink>,
    raw_log: Sink,
    lines: LineBuffer,
    runtime: Runtime,
    status: Ticker,
}

impl<T: Transport> Rover<T> {
    /// `status_period` paces the periodic status report
    pub fn new(
        transport: T,
        depacketizer: Depacketizer<Sink, Sink, Sink>,
        raw_log: Sink,
        t0: Epoch,
        status_period: Duration,
    ) -> Self {
        Self {
            transport,
            depacketizer,
            raw_log,
            lines: LineBuffer::default(),
            runtime: Runtime::new(t0),
            status: Ticker::new(status_period),
        }
    }

    #[cfg(test)]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Handles bytes read from the local receiver
    pub fn receiver_data(&mut self, data: &[u8]) {
        // the rtk worker snapshots this file concurrently
        if let Err(e) = self.raw_log.write_all(data).and_then(|_| self.raw_log.flush()) {
            error!("rover raw log: {}", e);
        }

        for line in self.lines.push(data) {
            match Sentence::parse(&line) {
                Some(sentence) => self.runtime.latch(sentence),
                None => trace!("ignored: {}", line),
            }
        }
    }

    /// Drains pending datagrams. Returns the number handled.
    pub fn poll_link(&mut self, now: Epoch) -> usize {
        let mut handled = 0;

        while handled < MAX_DATAGRAMS {
            match self.transport.receive() {
                Ok(Some(datagram)) => {
                    self.depacketizer.handle(now, &datagram);
                    handled += 1;
                },
                Ok(None) => break,
                Err(e) => {
                    error!("link: {}", e);
                    break;
                },
            }
        }

        handled
    }

    /// Periodic status report
    pub fn tick(&mut self, now: Epoch) {
        self.runtime.new_epoch(now);

        if !self.status.is_due(now) {
            return;
        }

        self.status.mark(now);

        let stats = self.depacketizer.stats();

        let pdop = self
            .runtime
            .pdop
            .map(|pdop| format!("{:.1}", pdop))
            .unwrap_or_else(|| "-".to_string());

        info!(
            "{} - uptime={} fixQ={} pdop={} corrections={} ({}B) malformed={} gaps={}",
            now,
            self.runtime.uptime,
            self.runtime.fix_quality(),
            pdop,
            stats.corrections,
            stats.bytes,
            stats.malformed,
            stats.gaps,
        );
    }

    /// Flushes every log (shutdown)
    pub fn close(mut self) -> T {
        if let Err(e) = self.raw_log.flush() {
            error!("rover raw log: {}", e);
        }

        let mut receiver = self.depacketizer.close();

        if let Err(e) = receiver.flush() {
            error!("receiver: {}", e);
        }

        self.transport
    }
}

/// Rover loop, until shutdown is requested
pub fn run<T: Transport, C: Clock>(
    mut device: Device,
    mut rover: Rover<T>,
    clock: C,
    shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0; 4096];
    let mut consumed = false;

    info!("{} - rover deployed ({})", clock.now(), device.name());

    while !*shutdown.borrow() {
        match device.read_interface(&mut buffer) {
            Ok(0) => {
                if device.is_read_only() && !consumed {
                    info!("{} - consumed all content", clock.now());
                    consumed = true;
                }
            },
            Ok(size) => rover.receiver_data(&buffer[..size]),
            Err(e) => error!("{} - receiver: {}", clock.now(), e),
        }

        let now = clock.now();
        rover.poll_link(now);
        rover.tick(now);

        std::thread::sleep(IDLE);
    }

    rover.close();
    info!("{} - rover stopped", clock.now());
}
