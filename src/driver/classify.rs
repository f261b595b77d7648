//! Path classification for file-style sources.
//!
//! Classification is a pure decision over the path and its node type; it never
//! fails. Problems with the resource surface later, when the opener opens it.

use crate::message::TransportTag;
use crate::opener::{
    DevKmsgOpener, DeviceOpener, FileOpener, NamedPipeOpener, OpenerKind, ProcKmsgOpener,
    RegularFileOpener,
};
use std::path::Path;

/// Follow frequency for regular files, in milliseconds
pub const DEFAULT_FOLLOW_FREQ: u64 = 1000;

const DEV_KMSG: &str = "/dev/kmsg";
const PROC_KMSG: &str = "/proc/kmsg";

/// Node type as reported by stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Regular,
    /// Exists but is not a regular file
    Special,
    Missing,
}

pub fn probe_node(path: &Path) -> NodeType {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => NodeType::Regular,
        Ok(_) => NodeType::Special,
        Err(_) => NodeType::Missing,
    }
}

/// Everything decided about a source in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceClass {
    pub opener: OpenerKind,
    pub tag: TransportTag,
    pub follow_freq: u64,
    pub needs_privileges: bool,
}

impl SourceClass {
    /// Restoring a read offset only makes sense for followed files
    pub fn restore_state(&self) -> bool {
        self.follow_freq > 0
    }

    pub fn build_opener(&self) -> Box<dyn FileOpener> {
        match self.opener {
            OpenerKind::RegularFile => Box::new(RegularFileOpener::new()),
            OpenerKind::Device => Box::new(DeviceOpener::new()),
            OpenerKind::DevKmsg => Box::new(DevKmsgOpener::new()),
            OpenerKind::ProcKmsg => Box::new(ProcKmsgOpener::new()),
            OpenerKind::NamedPipe => Box::new(NamedPipeOpener::new(true)),
        }
    }
}

fn is_linux_path(path: &Path, expected: &str) -> bool {
    cfg!(target_os = "linux") && path == Path::new(expected)
}

/// Classify a file() source by probing the path
pub fn classify(path: &Path) -> SourceClass {
    classify_node(path, probe_node(path))
}

pub fn classify_node(path: &Path, node: NodeType) -> SourceClass {
    if node == NodeType::Special {
        if is_linux_path(path, DEV_KMSG) {
            return SourceClass {
                opener: OpenerKind::DevKmsg,
                tag: TransportTag::DevKmsg,
                follow_freq: 0,
                needs_privileges: false,
            };
        }
        return SourceClass {
            opener: OpenerKind::Device,
            tag: TransportTag::Device,
            follow_freq: 0,
            needs_privileges: false,
        };
    }

    if is_linux_path(path, PROC_KMSG) {
        return SourceClass {
            opener: OpenerKind::ProcKmsg,
            tag: TransportTag::ProcKmsg,
            follow_freq: 0,
            needs_privileges: true,
        };
    }

    SourceClass {
        opener: OpenerKind::RegularFile,
        tag: TransportTag::File,
        follow_freq: DEFAULT_FOLLOW_FREQ,
        needs_privileges: false,
    }
}
