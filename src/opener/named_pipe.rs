//! Opener for named pipes (FIFOs).
//!
//! Missing FIFOs are created on prepare. Pipes are always opened non-blocking:
//! a blocking open of a FIFO waits for the other side to show up. A reader that
//! suppresses EOF opens read-write, so the process itself is always one of the
//! writers and the kernel never reports end-of-stream when external writers
//! disconnect.

use crate::error::{Result, SourceError};
use crate::opener::{generic, FileDirection, FileOpener, FileOpenerOptions, OpenFlags, OpenerKind};
use crate::transport::{EofPolicy, PipeTransport, Transport};
use std::ffi::CString;
use std::fs::Permissions;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;

/// Mode used for new FIFOs when no permission was configured (umask applies)
const DEFAULT_FIFO_MODE: u32 = 0o666;

#[derive(Debug, Default)]
pub struct NamedPipeOpener {
    options: FileOpenerOptions,
    suppress_eof: bool,
}

impl NamedPipeOpener {
    pub fn new(suppress_eof: bool) -> Self {
        Self {
            options: FileOpenerOptions::default(),
            suppress_eof,
        }
    }

    pub fn suppress_eof(&self) -> bool {
        self.suppress_eof
    }

    fn create_fifo(&self, path: &Path) -> Result<()> {
        let mode = self.options.file_perm.unwrap_or(DEFAULT_FIFO_MODE);
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            SourceError::filesystem(
                "Error creating named pipe, invalid path",
                io::Error::new(io::ErrorKind::InvalidInput, e),
            )
        })?;

        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        if unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) } < 0 {
            let err = io::Error::last_os_error();
            log::error!(
                "Error creating named pipe, mkfifo() returned an error, file={}, error={}",
                path.display(),
                err
            );
            return Err(SourceError::filesystem(
                format!("Error creating named pipe: {}", path.display()),
                err,
            ));
        }

        // mkfifo is subject to the umask; enforce the configured bits.
        if let Some(perm) = self.options.file_perm.filter(|_| !self.options.dont_change_perms) {
            std::fs::set_permissions(path, Permissions::from_mode(perm)).map_err(|e| {
                SourceError::filesystem(
                    format!("Failed to set permissions: {}", path.display()),
                    e,
                )
            })?;
        }
        log::info!("Created named pipe, file={}", path.display());
        Ok(())
    }
}

impl FileOpener for NamedPipeOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::NamedPipe
    }

    fn options(&self) -> &FileOpenerOptions {
        &self.options
    }

    fn set_options(&mut self, options: FileOpenerOptions) {
        self.options = options;
    }

    fn prepare(&self, path: &Path) -> Result<()> {
        generic::prepare(&self.options, path)?;

        match std::fs::metadata(path) {
            Err(e)
                if e.kind() == io::ErrorKind::NotFound
                    || e.raw_os_error() == Some(libc::ENOTDIR) =>
            {
                self.create_fifo(path)
            }
            Err(e) => Err(SourceError::filesystem(
                format!("Failed to stat named pipe: {}", path.display()),
                e,
            )),
            Ok(metadata) if metadata.file_type().is_fifo() => Ok(()),
            Ok(_) => {
                log::error!(
                    "You are using the pipe() driver, underlying file is not a FIFO, it should be used by file(), filename={}",
                    path.display()
                );
                Err(SourceError::wrong_resource_type(path, "named pipe"))
            }
        }
    }

    fn open_flags(&self, direction: FileDirection) -> OpenFlags {
        let common = OpenFlags::NOCTTY | OpenFlags::NONBLOCK | OpenFlags::LARGEFILE;
        match direction {
            FileDirection::Read if !self.suppress_eof => OpenFlags::READ | common,
            FileDirection::Read | FileDirection::Write => {
                OpenFlags::READ | OpenFlags::WRITE | common
            }
        }
    }

    fn construct_transport(&self, fd: OwnedFd) -> Box<dyn Transport> {
        let policy = if self.suppress_eof {
            EofPolicy::Ignore
        } else {
            EofPolicy::Report
        };
        Box::new(PipeTransport::with_eof_policy(fd, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{FetchStatus, ReadProtoOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn opener(suppress_eof: bool, perm: u32) -> NamedPipeOpener {
        let mut opener = NamedPipeOpener::new(suppress_eof);
        opener.set_options(FileOpenerOptions {
            file_perm: Some(perm),
            ..FileOpenerOptions::default()
        });
        opener
    }

    #[test]
    fn test_prepare_creates_fifo_with_configured_perms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.fifo");
        let opener = opener(true, 0o620);

        opener.prepare(&path).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.file_type().is_fifo());
        assert_eq!(metadata.permissions().mode() & 0o777, 0o620);

        // Second prepare keeps the existing node
        let inode = std::os::unix::fs::MetadataExt::ino(&metadata);
        opener.prepare(&path).unwrap();
        let again = std::fs::metadata(&path).unwrap();
        assert_eq!(std::os::unix::fs::MetadataExt::ino(&again), inode);
    }

    #[test]
    fn test_prepare_rejects_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.log");
        std::fs::write(&path, "not a pipe").unwrap();

        let err = opener(true, 0o600).prepare(&path).unwrap_err();
        assert!(matches!(err, SourceError::WrongResourceType { expected: "named pipe", .. }));
    }

    #[test]
    fn test_prepare_reports_mkfifo_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("input.fifo");

        let err = opener(true, 0o600).prepare(&path).unwrap_err();
        match err {
            SourceError::Filesystem { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("Expected Filesystem error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_flags_per_direction() {
        let common = OpenFlags::NOCTTY | OpenFlags::NONBLOCK | OpenFlags::LARGEFILE;
        let rw = OpenFlags::READ | OpenFlags::WRITE | common;

        let suppressing = NamedPipeOpener::new(true);
        assert_eq!(suppressing.open_flags(FileDirection::Read), rw);
        assert_eq!(suppressing.open_flags(FileDirection::Write), rw);

        let plain = NamedPipeOpener::new(false);
        assert_eq!(plain.open_flags(FileDirection::Read), OpenFlags::READ | common);
        assert_eq!(plain.open_flags(FileDirection::Write), rw);
    }

    #[test]
    fn test_suppressed_eof_after_last_writer_leaves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.fifo");
        let opener = opener(true, 0o600);

        let fd = opener.open(&path, FileDirection::Read).unwrap();
        let transport = opener.construct_transport(fd);
        let mut proto = opener.construct_read_protocol(transport, &ReadProtoOptions::default());

        {
            let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            writer.write_all(b"from writer\n").unwrap();
        }

        assert_eq!(
            proto.fetch().unwrap(),
            FetchStatus::Message(b"from writer".to_vec())
        );
        assert_eq!(proto.fetch().unwrap(), FetchStatus::Again);
        assert_eq!(proto.fetch().unwrap(), FetchStatus::Again);
    }

    #[test]
    fn test_plain_reader_sees_eof_after_last_writer_leaves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.fifo");
        let opener = opener(false, 0o600);

        let fd = opener.open(&path, FileDirection::Read).unwrap();
        let mut proto =
            opener.construct_read_protocol(opener.construct_transport(fd), &ReadProtoOptions::default());

        {
            let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            writer.write_all(b"last words\n").unwrap();
        }

        assert_eq!(
            proto.fetch().unwrap(),
            FetchStatus::Message(b"last words".to_vec())
        );
        assert_eq!(proto.fetch().unwrap(), FetchStatus::Eof);
    }
}
