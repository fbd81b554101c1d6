//! Radio link protocol.
//!
//! Correction packets: `[0xAA, 0xC1, seq, len, payload..]`, `len <= 200`.
//! Anything else on the link (beacons) is informational. The protocol is best
//! effort: no acknowledgment, no retransmission, the sequence number is for
//! telemetry only.
use bytes::Bytes;

pub mod depacketizer;
pub mod packetizer;
pub mod udp;

/// Correction packet magic
pub const MAGIC: [u8; 2] = [0xAA, 0xC1];

/// Magic + sequence + length
pub const HEADER_LEN: usize = 4;

/// Largest payload one packet may carry
pub const MAX_PAYLOAD: usize = 200;

/// Link liveness beacon
pub const BEACON: &[u8] = b"BASE_OK";

/// One chunk of the correction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPacket {
    pub seq: u8,
    pub payload: Bytes,
}

impl LinkPacket {
    /// Wire representation. Payload must not exceed [MAX_PAYLOAD].
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= MAX_PAYLOAD);
        let mut v = Vec::with_capacity(HEADER_LEN + self.payload.len());
        v.extend_from_slice(&MAGIC);
        v.push(self.seq);
        v.push(self.payload.len() as u8);
        v.extend_from_slice(&self.payload);
        v
    }
}

/// Received datagram classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Well formed correction packet
    Correction(LinkPacket),

    /// Correction magic, but declared and actual length disagree
    Malformed { seq: u8, declared: usize, actual: usize },

    /// Beacon or any other traffic
    Other,
}

impl Received {
    pub fn classify(datagram: &[u8]) -> Self {
        if datagram.len() < HEADER_LEN || datagram[..2] != MAGIC {
            return Self::Other;
        }

        let seq = datagram[2];
        let declared = datagram[3] as usize;
        let payload = &datagram[HEADER_LEN..];

        if payload.len() != declared {
            return Self::Malformed {
                seq,
                declared,
                actual: payload.len(),
            };
        }

        Self::Correction(LinkPacket {
            seq,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Received datagram, with link metrics when the radio reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    /// Received signal strength (dBm)
    pub rssi: Option<i16>,
    /// Signal to noise ratio (dB)
    pub snr: Option<f32>,
}

impl Datagram {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }
}

/// Half duplex packet radio, seen as a datagram transport.
pub trait Transport {
    /// Transmits one datagram
    fn send(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Waits for one datagram. Returns `Ok(None)` when the wait times out,
    /// so callers get a chance to observe shutdown.
    fn receive(&mut self) -> std::io::Result<Option<Datagram>>;
}
