mod interface;

pub use interface::Writer;

use interface::Interface;

use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
    time::Duration,
};

use log::debug;

use crate::error::{Error, Result};

/// Read timeout on the serial port
const PORT_TIMEOUT: Duration = Duration::from_millis(50);

/// Local GNSS receiver
pub struct Device {
    interface: Interface,
    name: String,
}

impl Device {
    /// Replays a file (passive mode). Gzip files must be terminated by `.gz`.
    pub fn open_file(fullpath: &Path) -> Result<Self> {
        let handle = Self::open_handle(fullpath)?;

        let interface = if is_gzip(fullpath) {
            Interface::from_gzip_file_handle(handle)
        } else {
            Interface::from_file_handle(handle)
        };

        Ok(Self {
            interface,
            name: fullpath.display().to_string(),
        })
    }

    /// Replays several files, in order
    pub fn open_files(fullpaths: &[&Path]) -> Result<Self> {
        let (first, others) = fullpaths.split_first().ok_or_else(|| Error::ReceiverOpen {
            port: String::default(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "no input file"),
        })?;

        let mut device = Self::open_file(first)?;

        for path in others {
            let handle = Self::open_handle(path)?;

            if is_gzip(path) {
                device.interface.stack_gzip_file_handle(handle);
            } else {
                device.interface.stack_file_handle(handle);
            }
        }

        Ok(device)
    }

    fn open_handle(fullpath: &Path) -> Result<File> {
        File::open(fullpath).map_err(|e| Error::ReceiverOpen {
            port: fullpath.display().to_string(),
            source: e,
        })
    }

    /// Opens the serial port the receiver is attached to
    pub fn open_serial_port(port_str: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_str, baud)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| Error::ReceiverOpen {
                port: port_str.to_string(),
                source: e.into(),
            })?;

        debug!("{} opened at {} bauds", port_str, baud);

        Ok(Self {
            interface: Interface::from_serial_port(port),
            name: port_str.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.interface.is_read_only()
    }

    /// Write handle, used to inject corrections into the receiver
    pub fn writer(&self) -> Result<Writer> {
        self.interface.writer().map_err(|e| Error::ReceiverOpen {
            port: self.name.clone(),
            source: e,
        })
    }

    /// Reads the [Interface] without blocking: an idle serial port and
    /// timeouts read as "no data", the loops poll the receiver continuously.
    pub fn read_interface(&mut self, output: &mut [u8]) -> std::io::Result<usize> {
        match self.interface.read(output) {
            Ok(b) => Ok(b),
            Err(e) => match e.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(0),
                _ => Err(e),
            },
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};

    fn read_all(device: &mut Device) -> Vec<u8> {
        let mut buf = [0; 7];
        let mut content = Vec::new();
        loop {
            let size = device.read_interface(&mut buf).unwrap();
            if size == 0 {
                return content;
            }
            content.extend_from_slice(&buf[..size]);
        }
    }

    #[test]
    fn replay_files_in_order() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("base_gps_1200.ubx");
        std::fs::write(&plain, b"\xd3\x00\x01first").unwrap();

        let gz = dir.path().join("base_gps_1300.ubx.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"second").unwrap();
        encoder.finish().unwrap();

        let mut device = Device::open_files(&[plain.as_path(), gz.as_path()]).unwrap();
        assert!(device.is_read_only());
        assert_eq!(read_all(&mut device), b"\xd3\x00\x01firstsecond");
    }

    #[test]
    fn replay_discards_writes() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("rover.ubx");
        std::fs::write(&plain, b"$GNGGA").unwrap();

        let device = Device::open_file(&plain).unwrap();
        let mut writer = device.writer().unwrap();
        writer.write_all(b"\xd3\x00\x00").unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read(&plain).unwrap(), b"$GNGGA");
    }

    #[test]
    fn missing_receiver() {
        let dir = tempfile::tempdir().unwrap();
        match Device::open_file(&dir.path().join("missing.ubx")) {
            Err(Error::ReceiverOpen { port, .. }) => assert!(port.ends_with("missing.ubx")),
            _ => panic!("missing file should fail"),
        }

        assert!(matches!(
            Device::open_serial_port("/dev/does-not-exist", 9600),
            Err(Error::ReceiverOpen { .. })
        ));

        assert!(Device::open_files(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn idle_port_does_not_block() {
        use serialport::{SerialPort, TTYPort};

        let (mut master, mut slave) = TTYPort::pair().unwrap();
        master.set_timeout(Duration::from_secs(2)).unwrap();

        let mut device = Device {
            interface: Interface::from_serial_port(Box::new(master)),
            name: "pty".to_string(),
        };

        let mut buf = [0; 64];

        let start = std::time::Instant::now();
        assert_eq!(device.read_interface(&mut buf).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(500));

        slave.write_all(b"$GNGGA\n").unwrap();
        slave.flush().unwrap();

        let mut content = Vec::new();
        let start = std::time::Instant::now();

        while content.len() < 6 && start.elapsed() < Duration::from_secs(2) {
            let size = device.read_interface(&mut buf).unwrap();
            content.extend_from_slice(&buf[..size]);
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(content.starts_with(b"$GNGGA"));
    }
}
