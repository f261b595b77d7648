//! Transport over character devices and kernel message buffers.

use crate::transport::{FdIo, Transport};
use std::io;
use std::os::fd::{OwnedFd, RawFd};

/// Device transport. Devices are read as they come and never followed.
///
/// `/dev/kmsg` fails a read with EPIPE when records were overwritten before
/// they could be read; the next read resumes at the oldest available record.
#[derive(Debug)]
pub struct DeviceTransport {
    io: FdIo,
    name: &'static str,
}

impl DeviceTransport {
    pub fn new(fd: OwnedFd) -> Self {
        Self::named(fd, "device")
    }

    pub fn named(fd: OwnedFd, name: &'static str) -> Self {
        Self {
            io: FdIo::new(fd),
            name,
        }
    }
}

impl Transport for DeviceTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn fd(&self) -> Option<RawFd> {
        self.io.raw_fd()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let io = &mut self.io;
        read_retrying_overrun(|b| io.read(b), buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.io.close()
    }
}

/// Retry a read once when it fails with EPIPE.
fn read_retrying_overrun(
    mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match read(buf) {
        Err(e) if e.raw_os_error() == Some(libc::EPIPE) => {
            log::warn!("kernel message buffer overrun, some records were lost");
            read(buf)
        }
        result => result,
    }
}
