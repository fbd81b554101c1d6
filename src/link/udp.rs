//! Datagram link through a UDP radio bridge.
//!
//! The radio modem (or its gateway daemon) exchanges one UDP datagram per
//! radio packet. Signal metrics are not reported through this bridge.
use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use log::debug;

use crate::link::{Datagram, Transport};

/// Largest radio packet, with some margin
const RECV_BUFFER_SIZE: usize = 512;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    buf: [u8; RECV_BUFFER_SIZE],
}

impl UdpTransport {
    /// Binds `local`, talks to `peer`. Receive waits at most `timeout`.
    pub fn open(local: SocketAddr, peer: SocketAddr, timeout: Duration) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(timeout))?;

        debug!("udp link {} <-> {}", socket.local_addr()?, peer);

        Ok(Self {
            socket,
            peer,
            buf: [0; RECV_BUFFER_SIZE],
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(data, self.peer)?;
        Ok(())
    }

    fn receive(&mut self) -> std::io::Result<Option<Datagram>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((size, from)) => {
                // still journaled by the depacketizer
                if from.ip() != self.peer.ip() {
                    debug!("datagram from unexpected source {}", from);
                }
                Ok(Some(Datagram::new(self.buf[..size].to_vec())))
            },
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => Ok(None),
                _ => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::{BEACON, Received};

    #[test]
    fn loopback_exchange() {
        let timeout = Duration::from_millis(500);
        let any = "127.0.0.1:0".parse().unwrap();

        // bind the rover first to learn its address
        let mut rover = UdpTransport::open(any, any, timeout).unwrap();
        let mut base = UdpTransport::open(any, rover.local_addr().unwrap(), timeout).unwrap();
        rover.peer = base.local_addr().unwrap();

        base.send(BEACON).unwrap();
        base.send(&[0xaa, 0xc1, 0, 1, 0xd3]).unwrap();

        let first = rover.receive().unwrap().unwrap();
        assert_eq!(first.bytes, BEACON);
        assert_eq!(first.rssi, None);

        let second = rover.receive().unwrap().unwrap();
        assert!(matches!(
            Received::classify(&second.bytes),
            Received::Correction(_)
        ));
    }

    #[test]
    fn foreign_datagrams_are_received() {
        let timeout = Duration::from_millis(500);
        let any = "127.0.0.1:0".parse().unwrap();

        // peer is a different host than the actual sender
        let peer = "127.0.0.2:5601".parse().unwrap();
        let mut rover = UdpTransport::open(any, peer, timeout).unwrap();

        let stranger = UdpSocket::bind(any).unwrap();
        stranger
            .send_to(b"hello", rover.local_addr().unwrap())
            .unwrap();

        let datagram = rover.receive().unwrap().unwrap();
        assert_eq!(datagram.bytes, b"hello");
    }

    #[test]
    fn receive_times_out_quietly() {
        let any = "127.0.0.1:0".parse().unwrap();
        let mut rover = UdpTransport::open(any, any, Duration::from_millis(20)).unwrap();
        assert!(rover.receive().unwrap().is_none());
    }
}
