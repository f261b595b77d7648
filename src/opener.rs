//! File opening strategies for the different kinds of local sources.
//!
//! A [`FileOpener`] bundles everything that differs between a regular file, a
//! character device, a kernel message buffer and a named pipe: filesystem
//! preparation, open flags, the transport built over the descriptor and the
//! protocols wrapped around that transport. Variants override only what they
//! need; everything else falls back to the functions in [`generic`].

pub mod device;
pub mod generic;
pub mod named_pipe;

use crate::config::GlobalConfig;
use crate::error::Result;
use crate::proto::{ReadProtoOptions, ReadProtocol, WriteProtoOptions, WriteProtocol};
use crate::transport::Transport;
use bitflags::bitflags;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

// Re-export main types
pub use device::{DevKmsgOpener, DeviceOpener, ProcKmsgOpener};
pub use generic::RegularFileOpener;
pub use named_pipe::NamedPipeOpener;

/// Whether a resource is opened as a source or a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDirection {
    Read,
    Write,
}

bitflags! {
    /// Open semantics requested by an opener, independent of the libc encoding.
    ///
    /// `READ | WRITE` means read-write access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const APPEND = 1 << 3;
        const NONBLOCK = 1 << 4;
        const NOCTTY = 1 << 5;
        const LARGEFILE = 1 << 6;
    }
}

#[cfg(target_os = "linux")]
const O_LARGEFILE: i32 = libc::O_LARGEFILE;
#[cfg(not(target_os = "linux"))]
const O_LARGEFILE: i32 = 0;

impl OpenFlags {
    /// Flags with no `OpenOptions` builder method, as passed to `open(2)`
    pub fn custom_flags(self) -> i32 {
        let mut flags = 0;
        if self.contains(Self::NONBLOCK) {
            flags |= libc::O_NONBLOCK;
        }
        if self.contains(Self::NOCTTY) {
            flags |= libc::O_NOCTTY;
        }
        if self.contains(Self::LARGEFILE) {
            flags |= O_LARGEFILE;
        }
        flags
    }

    /// Translate into `OpenOptions`; `mode` applies to newly created files
    pub fn to_open_options(self, mode: Option<u32>) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.contains(Self::READ))
            .write(self.contains(Self::WRITE))
            .append(self.contains(Self::APPEND))
            .create(self.contains(Self::CREATE))
            .custom_flags(self.custom_flags());
        if let Some(mode) = mode {
            options.mode(mode);
        }
        options
    }
}

/// Which opener variant handles a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenerKind {
    RegularFile,
    Device,
    DevKmsg,
    ProcKmsg,
    NamedPipe,
}

impl OpenerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::RegularFile => "regular file",
            Self::Device => "device",
            Self::DevKmsg => "/dev/kmsg",
            Self::ProcKmsg => "/proc/kmsg",
            Self::NamedPipe => "named pipe",
        }
    }
}

impl fmt::Display for OpenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Permission and privilege settings injected into an opener before use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOpenerOptions {
    /// Mode for created files and FIFOs; `None` inherits from the config at init
    pub file_perm: Option<u32>,
    /// Mode for created parent directories
    pub dir_perm: Option<u32>,
    pub create_dirs: bool,
    pub needs_privileges: bool,
    /// Leave permissions of existing and created nodes alone
    pub dont_change_perms: bool,
}

impl FileOpenerOptions {
    /// Defaults for sources that must never touch permissions
    pub fn defaults_dont_change_permissions(&mut self) {
        self.dont_change_perms = true;
        self.file_perm = None;
        self.dir_perm = None;
    }

    /// Fill unset permissions from the global configuration
    pub fn init(&mut self, cfg: &GlobalConfig) {
        if self.dont_change_perms {
            return;
        }
        self.file_perm.get_or_insert(cfg.file_perm);
        self.dir_perm.get_or_insert(cfg.dir_perm);
    }
}

/// Strategy for preparing, opening and wrapping one kind of resource.
///
/// Options are injected with [`FileOpener::set_options`] after construction and
/// before [`FileOpener::prepare`] runs.
pub trait FileOpener: Send + Sync + fmt::Debug {
    fn kind(&self) -> OpenerKind;

    fn options(&self) -> &FileOpenerOptions;

    fn set_options(&mut self, options: FileOpenerOptions);

    /// Filesystem side effects before opening, such as creating missing nodes
    fn prepare(&self, path: &Path) -> Result<()> {
        generic::prepare(self.options(), path)
    }

    fn open_flags(&self, direction: FileDirection) -> OpenFlags {
        generic::open_flags(direction)
    }

    /// Hook run on the freshly opened file
    fn after_open(&self, _file: &File, _direction: FileDirection) -> Result<()> {
        Ok(())
    }

    fn construct_transport(&self, fd: OwnedFd) -> Box<dyn Transport> {
        generic::construct_transport(fd)
    }

    fn construct_read_protocol(
        &self,
        transport: Box<dyn Transport>,
        options: &ReadProtoOptions,
    ) -> Box<dyn ReadProtocol> {
        generic::construct_read_protocol(transport, options)
    }

    fn construct_write_protocol(
        &self,
        transport: Box<dyn Transport>,
        options: &WriteProtoOptions,
    ) -> Box<dyn WriteProtocol> {
        generic::construct_write_protocol(transport, options)
    }

    /// Prepare and open `path`, returning the owned descriptor
    fn open(&self, path: &Path, direction: FileDirection) -> Result<OwnedFd> {
        generic::open(self, path, direction)
    }
}
