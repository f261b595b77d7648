//! Transport over a pipe or FIFO descriptor.

use crate::transport::file::read_ignoring_eof;
use crate::transport::{FdIo, Transport};
use std::io;
use std::os::fd::{OwnedFd, RawFd};

/// How a zero-byte read is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EofPolicy {
    /// `Ok(0)`: the last writer went away
    #[default]
    Report,
    /// `WouldBlock`: keep waiting for the next writer
    Ignore,
}

#[derive(Debug)]
pub struct PipeTransport {
    io: FdIo,
    eof: EofPolicy,
}

impl PipeTransport {
    pub fn new(fd: OwnedFd) -> Self {
        Self::with_eof_policy(fd, EofPolicy::Report)
    }

    pub fn with_eof_policy(fd: OwnedFd, eof: EofPolicy) -> Self {
        Self {
            io: FdIo::new(fd),
            eof,
        }
    }

    pub fn eof_policy(&self) -> EofPolicy {
        self.eof
    }
}

impl Transport for PipeTransport {
    fn name(&self) -> &str {
        "pipe"
    }

    fn fd(&self) -> Option<RawFd> {
        self.io.raw_fd()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.eof {
            EofPolicy::Report => self.io.read(buf),
            EofPolicy::Ignore => read_ignoring_eof(&mut self.io, buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.io.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::FromRawFd;

    fn os_pipe() -> (OwnedFd, File) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(rc, 0, "pipe2 failed");
        unsafe { (OwnedFd::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_reports_eof_after_writer_closes() {
        let (read_end, mut writer) = os_pipe();
        let mut transport = PipeTransport::new(read_end);

        writer.write_all(b"abc").unwrap();
        drop(writer);

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_ignore_policy_never_reports_eof() {
        let (read_end, writer) = os_pipe();
        let mut transport = PipeTransport::with_eof_policy(read_end, EofPolicy::Ignore);
        drop(writer);

        let err = transport.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(transport.eof_policy(), EofPolicy::Ignore);
    }

    #[test]
    fn test_empty_pipe_would_block() {
        let (read_end, _writer) = os_pipe();
        let mut transport = PipeTransport::new(read_end);

        let err = transport.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
