//! Openers for device nodes and the Linux kernel message buffers.

use crate::error::{Result, SourceError};
use crate::opener::{FileDirection, FileOpener, FileOpenerOptions, OpenerKind};
use crate::proto::{DgramServer, ReadProtoOptions, ReadProtocol};
use crate::transport::{DeviceTransport, Transport};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::fd::OwnedFd;

/// Character or block device that is read as it comes, never followed.
#[derive(Debug, Default)]
pub struct DeviceOpener {
    options: FileOpenerOptions,
}

impl DeviceOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileOpener for DeviceOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::Device
    }

    fn options(&self) -> &FileOpenerOptions {
        &self.options
    }

    fn set_options(&mut self, options: FileOpenerOptions) {
        self.options = options;
    }

    fn construct_transport(&self, fd: OwnedFd) -> Box<dyn Transport> {
        Box::new(DeviceTransport::new(fd))
    }
}

/// `/dev/kmsg`: one kernel record per read.
///
/// Reading starts at the end of the ring buffer so records already logged
/// before this process started are not replayed.
#[derive(Debug, Default)]
pub struct DevKmsgOpener {
    options: FileOpenerOptions,
}

impl DevKmsgOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileOpener for DevKmsgOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::DevKmsg
    }

    fn options(&self) -> &FileOpenerOptions {
        &self.options
    }

    fn set_options(&mut self, options: FileOpenerOptions) {
        self.options = options;
    }

    fn after_open(&self, file: &File, direction: FileDirection) -> Result<()> {
        if direction == FileDirection::Read {
            let mut file = file;
            file.seek(SeekFrom::End(0)).map_err(|e| {
                log::error!("Error seeking /dev/kmsg to the end, error={}", e);
                SourceError::filesystem("Failed to seek /dev/kmsg to the end", e)
            })?;
        }
        Ok(())
    }

    fn construct_transport(&self, fd: OwnedFd) -> Box<dyn Transport> {
        Box::new(DeviceTransport::named(fd, "devkmsg"))
    }

    fn construct_read_protocol(
        &self,
        transport: Box<dyn Transport>,
        options: &ReadProtoOptions,
    ) -> Box<dyn ReadProtocol> {
        Box::new(DgramServer::new(transport, options))
    }
}

/// Legacy `/proc/kmsg`; reading it requires elevated privileges.
#[derive(Debug, Default)]
pub struct ProcKmsgOpener {
    options: FileOpenerOptions,
}

impl ProcKmsgOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileOpener for ProcKmsgOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::ProcKmsg
    }

    fn options(&self) -> &FileOpenerOptions {
        &self.options
    }

    fn set_options(&mut self, options: FileOpenerOptions) {
        self.options = options;
    }

    fn construct_transport(&self, fd: OwnedFd) -> Box<dyn Transport> {
        Box::new(DeviceTransport::named(fd, "prockmsg"))
    }
}
