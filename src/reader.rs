//! File reader: drives an opener's protocol and turns input into messages.
//!
//! The reader owns the open protocol (and through it the transport stack and the
//! descriptor). It borrows the opener from its driver whenever it needs to
//! (re)open the resource.

use crate::config::GlobalConfig;
use crate::error::{Result, SourceError};
use crate::message::LogMessage;
use crate::opener::{FileDirection, FileOpener};
use crate::persist::{PersistEntry, PersistStore};
use crate::proto::{FetchStatus, ReadProtoOptions, ReadProtocol};
use bitflags::bitflags;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::fd::OwnedFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Poll interval for sources that are not followed (pipes, devices)
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Messages fetched per poll before yielding back to the driver
pub const DEFAULT_FETCH_LIMIT: usize = 100;

bitflags! {
    /// Message parsing flags handed to the downstream parser.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParseFlags: u32 {
        const EXPECT_HOSTNAME = 1 << 0;
        const NO_PARSE = 1 << 1;
        const CHECK_HOSTNAME = 1 << 2;
    }
}

/// Reader configuration bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReaderOptions {
    /// Milliseconds between growth/rotation checks; 0 disables following
    pub follow_freq: u64,
    /// Resume from the persisted offset; only meaningful when following
    pub restore_state: bool,
    /// Statistics bucket ("file", "pipe")
    pub stats_source: &'static str,
    pub parse_flags: ParseFlags,
    /// Stop at end of stream instead of reopening
    pub exit_on_eof: bool,
    /// `None` inherits `log_msg_size` from the config at init
    pub max_msg_size: Option<usize>,
    pub fetch_limit: usize,
}

impl Default for FileReaderOptions {
    fn default() -> Self {
        Self {
            follow_freq: 0,
            restore_state: false,
            stats_source: "file",
            parse_flags: ParseFlags::empty(),
            exit_on_eof: false,
            max_msg_size: None,
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

impl FileReaderOptions {
    pub fn init(&mut self, cfg: &GlobalConfig) -> Result<()> {
        let size = *self.max_msg_size.get_or_insert(cfg.log_msg_size);
        if size == 0 {
            return Err(SourceError::config("max message size must be positive"));
        }
        if self.fetch_limit == 0 {
            return Err(SourceError::config("fetch limit must be positive"));
        }
        Ok(())
    }

    pub fn proto_options(&self) -> ReadProtoOptions {
        let mut options = ReadProtoOptions::default();
        if let Some(size) = self.max_msg_size {
            options.max_msg_size = size;
        }
        options
    }

    pub fn poll_interval(&self) -> Duration {
        if self.follow_freq > 0 {
            Duration::from_millis(self.follow_freq)
        } else {
            DEFAULT_IDLE_INTERVAL
        }
    }
}

/// Reader state after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Messages were produced; poll again right away
    Active,
    /// Nothing to read now; wait for the poll interval
    Idle,
    /// End of stream with exit-on-eof set
    Finished,
}

#[derive(Debug)]
pub struct PollOutcome {
    pub messages: Vec<LogMessage>,
    pub status: PollStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    inode: u64,
}

impl FileIdentity {
    fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        metadata.is_file().then(|| Self {
            dev: metadata.dev(),
            inode: metadata.ino(),
        })
    }
}

/// Reads one path through a [`FileOpener`] until deinit.
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    file_name: String,
    options: FileReaderOptions,
    persist: Option<Arc<PersistStore>>,
    proto: Option<Box<dyn ReadProtocol>>,
    start_offset: u64,
    identity: Option<FileIdentity>,
    finished: bool,
}

impl FileReader {
    pub fn new(path: &Path, options: FileReaderOptions, cfg: &GlobalConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: path.display().to_string(),
            options,
            persist: cfg.persist().cloned(),
            proto: None,
            start_offset: 0,
            identity: None,
            finished: false,
        }
    }

    pub fn persist_name(&self) -> String {
        format!("file_source_curpos({})", self.file_name)
    }

    pub fn options(&self) -> &FileReaderOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.proto.is_some()
    }

    /// Offset of the first byte not yet turned into a message
    pub fn position(&self) -> u64 {
        self.start_offset + self.proto.as_ref().map_or(0, |p| p.consumed())
    }

    /// Open the resource, resuming from persisted state when enabled.
    pub fn init(&mut self, opener: &dyn FileOpener) -> Result<()> {
        self.open(opener, self.options.restore_state)
    }

    fn open(&mut self, opener: &dyn FileOpener, restore: bool) -> Result<()> {
        let fd = opener.open(&self.path, FileDirection::Read)?;
        let mut file = File::from(fd);

        let metadata = file.metadata().map_err(|e| {
            SourceError::filesystem(format!("Failed to stat {}", self.file_name), e)
        })?;
        let identity = FileIdentity::of(&metadata);

        let mut start = 0;
        if restore {
            if let Some(offset) = self.restorable_offset(identity, metadata.len()) {
                file.seek(SeekFrom::Start(offset)).map_err(|e| {
                    SourceError::filesystem(format!("Failed to seek {}", self.file_name), e)
                })?;
                log::info!(
                    "Restored file position, file={}, offset={}",
                    self.file_name,
                    offset
                );
                start = offset;
            }
        }

        let transport = opener.construct_transport(OwnedFd::from(file));
        self.proto =
            Some(opener.construct_read_protocol(transport, &self.options.proto_options()));
        self.start_offset = start;
        self.identity = identity;
        Ok(())
    }

    fn restorable_offset(&self, identity: Option<FileIdentity>, size: u64) -> Option<u64> {
        let entry = self.persist.as_ref()?.lookup(&self.persist_name())?;
        let current = identity?;
        if current.dev != entry.dev || current.inode != entry.inode {
            log::info!(
                "File identity changed since last run, reading from the beginning, file={}",
                self.file_name
            );
            return None;
        }
        if entry.offset > size {
            log::info!(
                "File shrunk since last run, reading from the beginning, file={}",
                self.file_name
            );
            return None;
        }
        Some(entry.offset)
    }

    fn save_position(&self) -> Result<()> {
        if !self.options.restore_state {
            return Ok(());
        }
        let (Some(store), Some(identity)) = (&self.persist, self.identity) else {
            return Ok(());
        };
        store.update(
            &self.persist_name(),
            PersistEntry {
                offset: self.position(),
                dev: identity.dev,
                inode: identity.inode,
            },
        )
    }

    /// Fetch up to `fetch_limit` messages.
    pub fn poll(&mut self, opener: &dyn FileOpener) -> Result<PollOutcome> {
        if self.finished {
            return Ok(PollOutcome {
                messages: Vec::new(),
                status: PollStatus::Finished,
            });
        }
        if self.proto.is_none() {
            self.open(opener, false)?;
        }

        let mut messages = Vec::new();
        let mut at_eof = false;
        if let Some(proto) = self.proto.as_mut() {
            while messages.len() < self.options.fetch_limit {
                match proto.fetch()? {
                    FetchStatus::Message(bytes) => {
                        messages.push(LogMessage::from_bytes(&bytes, &self.file_name))
                    }
                    FetchStatus::Again => break,
                    FetchStatus::Eof => {
                        at_eof = true;
                        break;
                    }
                }
            }
        }
        self.save_position()?;

        let status = if at_eof {
            self.handle_eof(opener)?
        } else if messages.is_empty() {
            PollStatus::Idle
        } else {
            PollStatus::Active
        };
        Ok(PollOutcome { messages, status })
    }

    fn handle_eof(&mut self, opener: &dyn FileOpener) -> Result<PollStatus> {
        let following = self.options.follow_freq > 0;
        if following && self.rotated_or_truncated() {
            self.proto = None;
            self.open(opener, false)?;
            return Ok(PollStatus::Active);
        }

        if self.options.exit_on_eof {
            log::info!("End of file reached, file={}", self.file_name);
            self.start_offset = self.position();
            self.proto = None;
            self.finished = true;
            return Ok(PollStatus::Finished);
        }

        if following {
            return Ok(PollStatus::Idle);
        }

        log::debug!("End of stream, reopening, file={}", self.file_name);
        self.proto = None;
        self.open(opener, false)?;
        Ok(PollStatus::Idle)
    }

    fn rotated_or_truncated(&self) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            // Removed without a replacement yet; keep reading the old file
            return false;
        };
        if FileIdentity::of(&metadata) != self.identity {
            log::info!(
                "Follow-mode file source moved, tracking of the new file is started, file={}",
                self.file_name
            );
            return true;
        }
        if metadata.len() < self.position() {
            log::info!(
                "File source was truncated, restarting from the beginning, file={}",
                self.file_name
            );
            return true;
        }
        false
    }

    /// Save the position and release the protocol, transport and descriptor.
    pub fn deinit(&mut self) -> Result<()> {
        let saved = self.save_position();
        self.proto = None;
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opener::RegularFileOpener;
    use std::io::Write;
    use tempfile::TempDir;

    fn followed() -> FileReaderOptions {
        FileReaderOptions {
            follow_freq: 1000,
            restore_state: true,
            max_msg_size: Some(1024),
            ..FileReaderOptions::default()
        }
    }

    fn payloads(outcome: &PollOutcome) -> Vec<&str> {
        outcome.messages.iter().map(|m| m.payload.as_str()).collect()
    }

    fn config_with_store() -> GlobalConfig {
        let mut cfg = GlobalConfig::default();
        cfg.attach_persist(Arc::new(PersistStore::in_memory()));
        cfg
    }

    #[test]
    fn test_options_init_inherits_message_size() {
        let mut options = FileReaderOptions::default();
        options.init(&GlobalConfig::default()).unwrap();
        assert_eq!(options.max_msg_size, Some(65536));
        assert_eq!(options.poll_interval(), DEFAULT_IDLE_INTERVAL);

        let mut broken = FileReaderOptions {
            max_msg_size: Some(0),
            ..FileReaderOptions::default()
        };
        assert!(broken.init(&GlobalConfig::default()).is_err());
    }

    #[test]
    fn test_reads_and_follows_growth() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let opener = RegularFileOpener::new();
        let cfg = GlobalConfig::default();
        let mut reader = FileReader::new(&path, followed(), &cfg);
        reader.init(&opener).unwrap();

        let outcome = reader.poll(&opener).unwrap();
        assert_eq!(payloads(&outcome), vec!["one", "two"]);
        assert_eq!(outcome.status, PollStatus::Idle);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"three\n").unwrap();

        let outcome = reader.poll(&opener).unwrap();
        assert_eq!(payloads(&outcome), vec!["three"]);
        assert_eq!(reader.position(), 14);
    }

    #[test]
    fn test_restores_position_across_readers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old\n").unwrap();

        let opener = RegularFileOpener::new();
        let cfg = config_with_store();

        let mut first = FileReader::new(&path, followed(), &cfg);
        first.init(&opener).unwrap();
        assert_eq!(payloads(&first.poll(&opener).unwrap()), vec!["old"]);
        first.deinit().unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"new\n").unwrap();

        let mut second = FileReader::new(&path, followed(), &cfg);
        second.init(&opener).unwrap();
        assert_eq!(payloads(&second.poll(&opener).unwrap()), vec!["new"]);
    }

    #[test]
    fn test_rotation_starts_new_file_from_beginning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "before\n").unwrap();

        let opener = RegularFileOpener::new();
        let cfg = GlobalConfig::default();
        let mut reader = FileReader::new(&path, followed(), &cfg);
        reader.init(&opener).unwrap();
        assert_eq!(payloads(&reader.poll(&opener).unwrap()), vec!["before"]);

        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, "after\n").unwrap();

        let outcome = reader.poll(&opener).unwrap();
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.status, PollStatus::Active);
        assert_eq!(payloads(&reader.poll(&opener).unwrap()), vec!["after"]);
    }

    #[test]
    fn test_exit_on_eof_finishes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("once.log");
        std::fs::write(&path, "only\n").unwrap();

        let opener = RegularFileOpener::new();
        let options = FileReaderOptions {
            exit_on_eof: true,
            ..FileReaderOptions::default()
        };
        let mut reader = FileReader::new(&path, options, &GlobalConfig::default());
        reader.init(&opener).unwrap();

        let outcome = reader.poll(&opener).unwrap();
        assert_eq!(payloads(&outcome), vec!["only"]);
        assert_eq!(outcome.status, PollStatus::Finished);
        assert!(!reader.is_open());
        assert_eq!(reader.poll(&opener).unwrap().status, PollStatus::Finished);
    }

    #[test]
    fn test_exit_on_eof_finishes_followed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tail.log");
        std::fs::write(&path, "first
second
").unwrap();

        let opener = RegularFileOpener::new();
        let options = FileReaderOptions {
            exit_on_eof: true,
            ..followed()
        };
        let mut reader = FileReader::new(&path, options, &config_with_store());
        reader.init(&opener).unwrap();

        let outcome = reader.poll(&opener).unwrap();
        assert_eq!(payloads(&outcome), vec!["first", "second"]);
        assert_eq!(outcome.status, PollStatus::Finished);
        assert_eq!(reader.poll(&opener).unwrap().status, PollStatus::Finished);

        // The saved offset survives teardown after finishing
        reader.deinit().unwrap();
        assert_eq!(reader.position(), 13);
    }
}
