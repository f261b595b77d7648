//! Default capabilities shared by every opener, and the regular file opener.
//!
//! Variants that do not override a [`FileOpener`] method end up here.

use crate::error::{Result, SourceError};
use crate::opener::{FileDirection, FileOpener, FileOpenerOptions, OpenFlags, OpenerKind};
use crate::proto::{
    ReadProtoOptions, ReadProtocol, TextClient, TextServer, WriteProtoOptions, WriteProtocol,
};
use crate::transport::{FileTransport, Transport};
use std::fs::{DirBuilder, Permissions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

/// Create missing parent directories when `create_dirs` is set.
pub fn prepare(options: &FileOpenerOptions, path: &Path) -> Result<()> {
    if !options.create_dirs {
        return Ok(());
    }
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    if let Some(mode) = options.dir_perm {
        builder.mode(mode);
    }
    builder.create(parent).map_err(|e| {
        log::error!(
            "Error creating containing directory, dir={}, error={}",
            parent.display(),
            e
        );
        SourceError::filesystem(
            format!("Failed to create directory: {}", parent.display()),
            e,
        )
    })
}

pub fn open_flags(direction: FileDirection) -> OpenFlags {
    let common = OpenFlags::NOCTTY | OpenFlags::NONBLOCK | OpenFlags::LARGEFILE;
    match direction {
        FileDirection::Read => OpenFlags::READ | common,
        FileDirection::Write => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND | common,
    }
}

pub fn construct_transport(fd: OwnedFd) -> Box<dyn Transport> {
    Box::new(FileTransport::new(fd))
}

pub fn construct_read_protocol(
    transport: Box<dyn Transport>,
    options: &ReadProtoOptions,
) -> Box<dyn ReadProtocol> {
    Box::new(TextServer::new(transport, options))
}

pub fn construct_write_protocol(
    transport: Box<dyn Transport>,
    options: &WriteProtoOptions,
) -> Box<dyn WriteProtocol> {
    Box::new(TextClient::new(transport, options))
}

/// Prepare, open and post-process `path` through `opener`'s capabilities.
pub fn open<O: FileOpener + ?Sized>(
    opener: &O,
    path: &Path,
    direction: FileDirection,
) -> Result<OwnedFd> {
    opener.prepare(path)?;

    let options = opener.options();
    let flags = opener.open_flags(direction);
    let create_mode = if options.dont_change_perms {
        None
    } else {
        options.file_perm
    };

    let file = flags
        .to_open_options(create_mode)
        .open(path)
        .map_err(|e| open_error(options, path, e))?;

    if direction == FileDirection::Write && !options.dont_change_perms {
        if let Some(mode) = options.file_perm {
            file.set_permissions(Permissions::from_mode(mode))
                .map_err(|e| {
                    SourceError::filesystem(
                        format!("Failed to set permissions: {}", path.display()),
                        e,
                    )
                })?;
        }
    }

    opener.after_open(&file, direction)?;
    log::debug!(
        "opened {} as {} with {:?}",
        path.display(),
        opener.kind(),
        flags
    );
    Ok(OwnedFd::from(file))
}

fn open_error(options: &FileOpenerOptions, path: &Path, err: io::Error) -> SourceError {
    let denied = err.kind() == io::ErrorKind::PermissionDenied
        || err.raw_os_error() == Some(libc::EPERM);
    if options.needs_privileges && denied {
        log::error!(
            "Insufficient privileges to open source, file={}, error={}",
            path.display(),
            err
        );
        return SourceError::privilege(path, err);
    }
    log::error!("Error opening file, file={}, error={}", path.display(), err);
    SourceError::filesystem(format!("Failed to open file: {}", path.display()), err)
}

/// Opener for regular files; every capability is the default.
#[derive(Debug, Default)]
pub struct RegularFileOpener {
    options: FileOpenerOptions,
}

impl RegularFileOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileOpener for RegularFileOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::RegularFile
    }

    fn options(&self) -> &FileOpenerOptions {
        &self.options
    }

    fn set_options(&mut self, options: FileOpenerOptions) {
        self.options = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::FetchStatus;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_default_open_flags() {
        assert_eq!(
            open_flags(FileDirection::Read),
            OpenFlags::READ | OpenFlags::NOCTTY | OpenFlags::NONBLOCK | OpenFlags::LARGEFILE
        );
        let write = open_flags(FileDirection::Write);
        assert!(write.contains(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND));
        assert!(!write.contains(OpenFlags::READ));
    }

    #[test]
    fn test_regular_open_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "hello\n").unwrap();

        let opener = RegularFileOpener::new();
        let fd = opener.open(&path, FileDirection::Read).unwrap();
        let transport = opener.construct_transport(fd);
        assert_eq!(transport.name(), "file");

        let mut proto = opener.construct_read_protocol(transport, &ReadProtoOptions::default());
        assert_eq!(
            proto.fetch().unwrap(),
            FetchStatus::Message(b"hello".to_vec())
        );
    }

    #[test]
    fn test_missing_file_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let err = RegularFileOpener::new()
            .open(&dir.path().join("missing.log"), FileDirection::Read)
            .unwrap_err();
        assert!(matches!(err, SourceError::Filesystem { .. }));
    }

    #[test]
    fn test_write_creates_parent_dirs_and_applies_perms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("out.log");

        let mut opener = RegularFileOpener::new();
        opener.set_options(FileOpenerOptions {
            file_perm: Some(0o640),
            dir_perm: Some(0o750),
            create_dirs: true,
            ..FileOpenerOptions::default()
        });

        let fd = opener.open(&path, FileDirection::Write).unwrap();
        let mut proto =
            opener.construct_write_protocol(opener.construct_transport(fd), &WriteProtoOptions::default());
        proto.post(b"line").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"line\n");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_without_create_dirs_missing_parent_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("out.log");

        let result = RegularFileOpener::new().open(&path, FileDirection::Write);
        assert!(matches!(result, Err(SourceError::Filesystem { .. })));
    }

    #[test]
    fn test_open_error_maps_denied_to_privilege_when_required() {
        let privileged = FileOpenerOptions {
            needs_privileges: true,
            ..FileOpenerOptions::default()
        };
        let path = Path::new("/proc/kmsg");

        for denied in [
            io::Error::from_raw_os_error(libc::EPERM),
            io::Error::from_raw_os_error(libc::EACCES),
            io::Error::from(io::ErrorKind::PermissionDenied),
        ] {
            match open_error(&privileged, path, denied) {
                SourceError::Privilege { path: reported, .. } => {
                    assert_eq!(reported, std::path::PathBuf::from("/proc/kmsg"))
                }
                other => panic!("Expected Privilege error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_open_error_stays_filesystem_without_privilege_flag() {
        let plain = FileOpenerOptions::default();
        let path = Path::new("/var/log/app.log");

        let err = open_error(&plain, path, io::Error::from_raw_os_error(libc::EPERM));
        assert!(matches!(err, SourceError::Filesystem { .. }));

        let err = open_error(&plain, path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, SourceError::Filesystem { .. }));
    }

    #[test]
    fn test_open_error_other_failures_are_filesystem() {
        let privileged = FileOpenerOptions {
            needs_privileges: true,
            ..FileOpenerOptions::default()
        };
        let err = open_error(
            &privileged,
            Path::new("/proc/kmsg"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        match err {
            SourceError::Filesystem { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("Expected Filesystem error, got {other:?}"),
        }
    }
}
