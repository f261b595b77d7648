//! Byte transports over file descriptors and the stack that switches between them.
//!
//! A [`Transport`] moves raw bytes over exactly one descriptor. Reads follow the
//! `std::io` conventions: `Ok(0)` is end of stream and an `ErrorKind::WouldBlock`
//! error means no data is available right now.

pub mod device;
pub mod file;
pub mod pipe;
pub mod stack;

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

// Re-export main types
pub use device::DeviceTransport;
pub use file::FileTransport;
pub use pipe::{EofPolicy, PipeTransport};
pub use stack::{TransportFactory, TransportStack};

/// Byte-level read/write/close over one I/O substrate.
pub trait Transport: Send + fmt::Debug {
    /// Identity tag, e.g. "file" or "pipe"
    fn name(&self) -> &str;

    /// The descriptor this transport owns; `None` once closed
    fn fd(&self) -> Option<RawFd>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Release the descriptor. Further reads and writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Protocol layers a connection may pass through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportIndex {
    /// Single transport that never changes
    Initial,
    Socket,
    Tls,
    ProxyHeader,
    Compressed,
    /// Not a slot; switching to it always fails
    None,
}

impl TransportIndex {
    /// Number of real slots (everything but `None`)
    pub const SLOTS: usize = 5;

    pub const ALL: [TransportIndex; 6] = [
        Self::Initial,
        Self::Socket,
        Self::Tls,
        Self::ProxyHeader,
        Self::Compressed,
        Self::None,
    ];

    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            Self::Initial => Some(0),
            Self::Socket => Some(1),
            Self::Tls => Some(2),
            Self::ProxyHeader => Some(3),
            Self::Compressed => Some(4),
            Self::None => None,
        }
    }
}

/// Descriptor-backed I/O shared by the concrete transports.
#[derive(Debug)]
pub(crate) struct FdIo {
    file: Option<File>,
}

impl FdIo {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self {
            file: Some(File::from(fd)),
        }
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        loop {
            match file.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        loop {
            match file.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    pub(crate) fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(_) => Ok(()),
            None => Err(closed()),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}
