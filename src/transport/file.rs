//! Transport over a regular file descriptor.

use crate::transport::{FdIo, Transport};
use std::io;
use std::os::fd::{OwnedFd, RawFd};

/// Plain file transport; `Ok(0)` from `read` means the current end of file.
#[derive(Debug)]
pub struct FileTransport {
    io: FdIo,
}

impl FileTransport {
    pub fn new(fd: OwnedFd) -> Self {
        Self { io: FdIo::new(fd) }
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    fn fd(&self) -> Option<RawFd> {
        self.io.raw_fd()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.io.close()
    }
}

/// Read that reports a zero-byte result as "no data yet" instead of end of stream.
pub(crate) fn read_ignoring_eof(io: &mut FdIo, buf: &mut [u8]) -> io::Result<usize> {
    match io.read(buf)? {
        0 if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_until_eof() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let fd = OwnedFd::from(file.reopen().unwrap());

        let mut transport = FileTransport::new(fd);
        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(transport.name(), "file");
    }

    #[test]
    fn test_ignoring_eof_turns_zero_into_would_block() {
        let file = NamedTempFile::new().unwrap();
        let mut io = FdIo::new(OwnedFd::from(file.reopen().unwrap()));

        let err = read_ignoring_eof(&mut io, &mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_close_releases_descriptor() {
        let file = NamedTempFile::new().unwrap();
        let mut transport = FileTransport::new(OwnedFd::from(file.reopen().unwrap()));

        transport.close().unwrap();
        assert!(transport.fd().is_none());
        assert!(transport.write(b"x").is_err());
    }
}
