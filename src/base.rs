//! Base role: reference receiver corrections onto the link.
use std::io::Write;

use hifitime::prelude::Epoch;
use log::{error, info, trace};
use tokio::sync::watch;

use crate::{
    clock::Clock,
    device::Device,
    link::{Transport, packetizer::Packetizer},
    rtcm::FrameExtractor,
    settings::Sink,
};

/// Pause between two iterations
const IDLE: std::time::Duration = std::time::Duration::from_millis(5);

pub struct Base<T: Transport> {
    extractor: FrameExtractor,
    packetizer: Packetizer<T, Sink>,
    raw_log: Sink,
}

impl<T: Transport> Base<T> {
    pub fn new(packetizer: Packetizer<T, Sink>, raw_log: Sink) -> Self {
        Self {
            packetizer,
            raw_log,
            extractor: FrameExtractor::new(),
        }
    }

    /// Handles bytes read from the reference receiver
    pub fn receiver_data(&mut self, data: &[u8]) {
        if let Err(e) = self.raw_log.write_all(data) {
            error!("base raw log: {}", e);
        }

        for frame in self.extractor.push(data) {
            trace!(
                "RTCM {} ({} bytes)",
                frame.message_type().unwrap_or_default(),
                frame.len()
            );
            self.packetizer.enqueue(frame.as_bytes());
        }
    }

    /// Transmission opportunities: packets then beacon
    pub fn poll(&mut self, now: Epoch) {
        self.packetizer.poll(now);
        self.packetizer.poll_beacon(now);
    }

    /// Flushes every log (shutdown)
    pub fn close(mut self) -> T {
        if let Err(e) = self.raw_log.flush() {
            error!("base raw log: {}", e);
        }

        if self.extractor.discarded() > 0 {
            info!("{} bytes discarded while resynchronizing", self.extractor.discarded());
        }

        if self.extractor.pending() > 0 {
            info!("{} bytes of incomplete frame dropped", self.extractor.pending());
        }

        if self.packetizer.queued() > 0 {
            info!("{} bytes left untransmitted", self.packetizer.queued());
        }

        self.packetizer.close()
    }
}

/// Base loop, until shutdown is requested
pub fn run<T: Transport, C: Clock>(
    mut device: Device,
    mut base: Base<T>,
    clock: C,
    shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0; 4096];
    let mut consumed = false;

    info!("{} - base deployed ({})", clock.now(), device.name());

    while !*shutdown.borrow() {
        match device.read_interface(&mut buffer) {
            Ok(0) => {
                if device.is_read_only() && !consumed {
                    info!("{} - consumed all content", clock.now());
                    consumed = true;
                }
            },
            Ok(size) => base.receiver_data(&buffer[..size]),
            Err(e) => error!("{} - receiver: {}", clock.now(), e),
        }

        base.poll(clock.now());
        std::thread::sleep(IDLE);
    }

    base.close();
    info!("{} - base stopped", clock.now());
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::{Arc, Mutex};

    use hifitime::prelude::Duration;

    use crate::{
        audit::AuditLog,
        clock::test::ManualClock,
        link::{Received, test::Loopback},
        settings::LinkSettings,
    };

    /// Shared in memory log
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frame(payload_len: usize) -> Vec<u8> {
        let mut frame = vec![0xD3, (payload_len >> 8) as u8, payload_len as u8];
        frame.extend((0..payload_len).map(|i| i as u8));
        frame.extend([0xAB, 0xCD, 0xEF]);
        frame
    }

    #[test]
    fn receiver_stream_to_packets() {
        let raw = Shared::default();
        let journal = Shared::default();

        let audit = AuditLog::new(Box::new(journal.clone()) as Sink, false).unwrap();
        let packetizer = Packetizer::new(Loopback::default(), audit, &LinkSettings::default());
        let mut base = Base::new(packetizer, Box::new(raw.clone()));

        let clock = ManualClock::new();

        // 150 + 156 bytes of corrections, NMEA noise in between
        let mut stream = b"$GNGGA,noise\r\n".to_vec();
        stream.extend(frame(144));
        stream.extend(b"\xb5\x62");
        stream.extend(frame(150));

        let (first, second) = stream.split_at(100);
        base.receiver_data(first);
        base.poll(clock.now());
        base.receiver_data(second);
        base.poll(clock.now());

        clock.advance(Duration::from_milliseconds(300.0));
        base.poll(clock.now());

        let transport = base.close();

        // beacon, one full packet, then the tail
        assert_eq!(transport.sent.len(), 3);
        assert_eq!(transport.sent[0], b"BASE_OK");

        let corrections = transport.sent[1..]
            .iter()
            .map(|datagram| match Received::classify(datagram) {
                Received::Correction(packet) => packet,
                other => panic!("unexpected {:?}", other),
            })
            .collect::<Vec<_>>();

        assert_eq!(corrections[0].seq, 0);
        assert_eq!(corrections[0].payload.len(), 200);
        assert_eq!(corrections[1].seq, 1);
        assert_eq!(corrections[1].payload.len(), 106);

        let mut relayed = corrections[0].payload.to_vec();
        relayed.extend_from_slice(&corrections[1].payload);

        let mut expected = frame(144);
        expected.extend(frame(150));
        assert_eq!(relayed, expected);

        // the raw log keeps everything
        assert_eq!(*raw.0.lock().unwrap(), stream);

        let journal = String::from_utf8(journal.0.lock().unwrap().clone()).unwrap();
        assert_eq!(journal.lines().count(), 4);
    }
}
