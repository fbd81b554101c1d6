use std::{
    collections::VecDeque,
    fs::File,
    io::{Read, Write},
};

use flate2::read::GzDecoder;
use serialport::SerialPort;

/// [Interface] to the local receiver
pub enum Interface {
    /// [Interface::ReadOnly] replays files, one after the other.
    ReadOnly(VecDeque<Box<dyn Read + Send>>),

    /// [Interface::Port] is connected to a physical receiver.
    Port(Box<dyn SerialPort>),
}

impl Interface {
    /// Creates a new [SerialPort] interface
    pub fn from_serial_port(port: Box<dyn SerialPort>) -> Self {
        Self::Port(port)
    }

    /// Creates a new Read-Only interface
    pub fn from_file_handle(handle: File) -> Self {
        Self::ReadOnly(VecDeque::from([Box::new(handle) as Box<dyn Read + Send>]))
    }

    /// Creates a new Read-Only interface from a gzip compressed file
    pub fn from_gzip_file_handle(handle: File) -> Self {
        Self::ReadOnly(VecDeque::from([
            Box::new(GzDecoder::new(handle)) as Box<dyn Read + Send>
        ]))
    }

    /// Replays this file once the previous ones are consumed
    pub fn stack_file_handle(&mut self, handle: File) {
        if let Self::ReadOnly(files) = self {
            files.push_back(Box::new(handle));
        }
    }

    /// Replays this gzip compressed file once the previous ones are consumed
    pub fn stack_gzip_file_handle(&mut self, handle: File) {
        if let Self::ReadOnly(files) = self {
            files.push_back(Box::new(GzDecoder::new(handle)));
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly(_))
    }

    /// Write side of this interface. Writes to a replay are discarded.
    pub fn writer(&self) -> std::io::Result<Writer> {
        match self {
            Self::ReadOnly(_) => Ok(Writer::Discard),
            Self::Port(port) => Ok(Writer::Port(port.try_clone()?)),
        }
    }
}

impl Read for Interface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::ReadOnly(files) => {
                while let Some(current) = files.front_mut() {
                    let size = current.read(buf)?;
                    if size > 0 || buf.is_empty() {
                        return Ok(size);
                    }
                    files.pop_front();
                }
                Ok(0)
            },
            Self::Port(port) => {
                // never wait on an idle receiver
                if port.bytes_to_read()? == 0 {
                    return Ok(0);
                }
                port.read(buf)
            },
        }
    }
}

/// Independent write handle on the local receiver
pub enum Writer {
    Port(Box<dyn SerialPort>),
    Discard,
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Port(port) => port.write(buf),
            Self::Discard => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Port(port) => port.flush(),
            Self::Discard => Ok(()),
        }
    }
}
