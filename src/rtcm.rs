//! RTCM3 frame extraction from the reference receiver byte stream.
//!
//! The receiver output interleaves RTCM3 with UBX and NMEA traffic. Only RTCM3
//! frames are relayed: `0xD3`, 6 reserved bits + 10 bit length, payload, CRC24.
//! The CRC is not verified here, the rover receiver does it.
use bytes::{Buf, Bytes, BytesMut};
use log::trace;

/// RTCM3 frame preamble
pub const PREAMBLE: u8 = 0xD3;

/// Preamble + length field
pub const HEADER_LEN: usize = 3;

/// CRC24Q trailer
pub const CRC_LEN: usize = 3;

/// Largest payload the 10 bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = 1023;

/// A complete RTCM3 frame (header, payload and trailer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionFrame {
    bytes: Bytes,
}

impl CorrectionFrame {
    /// Declared payload length
    pub fn payload_len(&self) -> usize {
        declared_len(&self.bytes)
    }

    /// RTCM message number (first 12 bits of the payload)
    pub fn message_type(&self) -> Option<u16> {
        if self.payload_len() < 2 {
            return None;
        }
        let hi = self.bytes[HEADER_LEN] as u16;
        let lo = self.bytes[HEADER_LEN + 1] as u16;
        Some((hi << 4) | (lo >> 4))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

fn declared_len(header: &[u8]) -> usize {
    (((header[1] as usize) << 8) | header[2] as usize) & MAX_PAYLOAD_LEN
}

/// Pulls complete frames out of an arbitrarily chunked byte stream.
/// Incomplete frames stay buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buf: BytesMut,
    discarded: u64,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly received bytes, returns every frame now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<CorrectionFrame> {
        self.buf.extend_from_slice(data);
        self.extract()
    }

    /// Extracts every complete frame currently buffered.
    pub fn extract(&mut self) -> Vec<CorrectionFrame> {
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }

            match self.buf.iter().position(|b| *b == PREAMBLE) {
                None => {
                    // nothing useful in here
                    trace!("dropping {} bytes without preamble", self.buf.len());
                    self.discarded += self.buf.len() as u64;
                    self.buf.clear();
                    break;
                },
                Some(0) => {},
                Some(start) => {
                    trace!("resync: dropping {} bytes", start);
                    self.discarded += start as u64;
                    self.buf.advance(start);
                },
            }

            if self.buf.len() < HEADER_LEN {
                break;
            }

            let total = HEADER_LEN + declared_len(&self.buf) + CRC_LEN;

            if self.buf.len() < total {
                break;
            }

            frames.push(CorrectionFrame {
                bytes: self.buf.split_to(total).freeze(),
            });
        }

        frames
    }

    /// Bytes waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total number of bytes dropped while resynchronizing
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
