//! Source drivers: the top-level objects a configuration declares.
//!
//! A [`FileSourceDriver`] picks an opener for its path, configures a
//! [`FileReader`] around it and stamps a transport tag on everything it
//! forwards. Ownership is a tree: the driver owns the opener and the reader,
//! the reader owns the protocol, which owns the transport stack and through it
//! the descriptor.

pub mod classify;
pub mod dest;

pub use classify::{classify, classify_node, probe_node, NodeType, SourceClass};
pub use dest::PipeDestinationDriver;

use crate::config::{GlobalConfig, COMPAT_PIPE_HOSTNAME};
use crate::error::{Result, SourceError};
use crate::message::{LogMessage, MessageSink, TransportTag};
use crate::opener::{FileOpener, FileOpenerOptions, NamedPipeOpener, OpenerKind};
use crate::reader::{FileReader, FileReaderOptions, ParseFlags, PollStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of a driver. Init and deinit are each valid exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Configured,
    Running,
    Deinitialized,
}

impl DriverState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Deinitialized => "deinitialized",
        }
    }

    fn check(self, operation: &'static str, expected: Self) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(SourceError::InvalidTransition {
                operation,
                state: self.name(),
            })
        }
    }
}

/// Behavior shared by every source driver: identity and forwarded-message counting.
#[derive(Debug)]
pub struct SourceDriverBase {
    id: String,
    stats_source: &'static str,
    forwarded: u64,
    initialized: bool,
}

impl SourceDriverBase {
    pub fn new(id: impl Into<String>, stats_source: &'static str) -> Self {
        Self {
            id: id.into(),
            stats_source,
            forwarded: 0,
            initialized: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats_source(&self) -> &'static str {
        self.stats_source
    }

    /// Messages forwarded since init
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn init(&mut self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SourceError::config("source driver without an id"));
        }
        self.forwarded = 0;
        self.initialized = true;
        log::debug!("source driver initialized, id={}, stats={}", self.id, self.stats_source);
        Ok(())
    }

    pub fn deinit(&mut self) {
        if self.initialized {
            log::debug!(
                "source driver deinitialized, id={}, forwarded={}",
                self.id,
                self.forwarded
            );
        }
        self.initialized = false;
    }

    pub fn queue(&mut self, msg: LogMessage, sink: &mut dyn MessageSink) -> Result<()> {
        sink.forward(msg)?;
        self.forwarded += 1;
        Ok(())
    }
}

/// Source driver for `file()` and `pipe()` declarations.
#[derive(Debug)]
pub struct FileSourceDriver {
    base: SourceDriverBase,
    filename: PathBuf,
    opener: Box<dyn FileOpener>,
    transport_tag: TransportTag,
    reader_options: FileReaderOptions,
    opener_options: FileOpenerOptions,
    reader: Option<FileReader>,
    state: DriverState,
    legacy_hostname: bool,
}

impl FileSourceDriver {
    fn new_instance(path: &Path, stats_source: &'static str, opener: Box<dyn FileOpener>) -> Self {
        let filename = path.to_path_buf();
        Self {
            base: SourceDriverBase::new(filename.display().to_string(), stats_source),
            filename,
            opener,
            transport_tag: TransportTag::File,
            reader_options: FileReaderOptions {
                stats_source,
                ..FileReaderOptions::default()
            },
            opener_options: FileOpenerOptions::default(),
            reader: None,
            state: DriverState::Configured,
            legacy_hostname: false,
        }
    }

    /// `file()` source: classifies `path` and configures opener, tag and following.
    pub fn file(path: impl AsRef<Path>, _cfg: &GlobalConfig) -> Self {
        let path = path.as_ref();
        let class = classify(path);
        let mut driver = Self::new_instance(path, "file", class.build_opener());

        driver.transport_tag = class.tag;
        driver.reader_options.follow_freq = class.follow_freq;
        driver.reader_options.restore_state = class.restore_state();
        driver.opener_options.defaults_dont_change_permissions();
        driver.opener_options.needs_privileges = class.needs_privileges;
        driver.opener_options.create_dirs = false;

        log::debug!(
            "file source configured, file={}, opener={}, transport={}",
            path.display(),
            class.opener,
            class.tag
        );
        driver
    }

    /// `pipe()` source over a named pipe, created on init when missing.
    pub fn pipe(path: impl AsRef<Path>, cfg: &GlobalConfig) -> Self {
        let path = path.as_ref();
        let exit_on_eof = FileReaderOptions::default().exit_on_eof;
        let opener = Box::new(NamedPipeOpener::new(!exit_on_eof));
        let mut driver = Self::new_instance(path, "pipe", opener);
        driver.transport_tag = TransportTag::Pipe;

        if cfg.is_version_older(COMPAT_PIPE_HOSTNAME) {
            log::warn!(
                "pipe() sources expect a hostname in incoming messages for configurations older \
                 than {}, set the configuration version to at least {} to parse them like \
                 file() sources, file={}",
                COMPAT_PIPE_HOSTNAME,
                COMPAT_PIPE_HOSTNAME,
                path.display()
            );
            driver.reader_options.parse_flags.insert(ParseFlags::EXPECT_HOSTNAME);
            driver.legacy_hostname = true;
        } else {
            driver.reader_options.parse_flags.remove(ParseFlags::EXPECT_HOSTNAME);
        }
        driver
    }

    /// Stop at end of stream. For pipes this also changes how the FIFO is opened.
    pub fn set_exit_on_eof(&mut self, exit_on_eof: bool) {
        self.reader_options.exit_on_eof = exit_on_eof;
        if self.opener.kind() == OpenerKind::NamedPipe {
            self.opener = Box::new(NamedPipeOpener::new(!exit_on_eof));
        }
    }

    pub fn set_create_dirs(&mut self, create_dirs: bool) {
        self.opener_options.create_dirs = create_dirs;
    }

    /// Follow frequency in milliseconds; restore-state follows it
    pub fn set_follow_freq(&mut self, follow_freq: u64) {
        self.reader_options.follow_freq = follow_freq;
        self.reader_options.restore_state = follow_freq > 0;
    }

    pub fn set_file_perm(&mut self, perm: u32) {
        self.opener_options.file_perm = Some(perm);
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn transport_tag(&self) -> TransportTag {
        self.transport_tag
    }

    pub fn opener_kind(&self) -> OpenerKind {
        self.opener.kind()
    }

    pub fn reader_options(&self) -> &FileReaderOptions {
        &self.reader_options
    }

    pub fn opener_options(&self) -> &FileOpenerOptions {
        &self.opener_options
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn reader(&self) -> Option<&FileReader> {
        self.reader.as_ref()
    }

    pub fn base(&self) -> &SourceDriverBase {
        &self.base
    }

    /// Whether this pipe() source runs with the pre-3.2 hostname parsing
    pub fn legacy_hostname(&self) -> bool {
        self.legacy_hostname
    }

    /// Initialize base, options and reader; on failure nothing stays initialized.
    pub fn init(&mut self, cfg: &GlobalConfig) -> Result<()> {
        self.state.check("init", DriverState::Configured)?;

        self.base
            .init()
            .map_err(|e| SourceError::initialization("source driver", e))?;

        if let Err(e) = self.init_reader(cfg) {
            self.base.deinit();
            log::error!(
                "Error initializing source driver, file={}, error={}",
                self.filename.display(),
                e
            );
            return Err(e);
        }

        self.state = DriverState::Running;
        Ok(())
    }

    fn init_reader(&mut self, cfg: &GlobalConfig) -> Result<()> {
        let mut reader_options = self.reader_options.clone();
        reader_options
            .init(cfg)
            .map_err(|e| SourceError::initialization("reader options", e))?;

        let mut opener_options = self.opener_options.clone();
        opener_options.init(cfg);
        self.opener.set_options(opener_options.clone());

        let mut reader = FileReader::new(&self.filename, reader_options.clone(), cfg);
        reader
            .init(self.opener.as_ref())
            .map_err(|e| SourceError::initialization("file reader", e))?;

        self.reader_options = reader_options;
        self.opener_options = opener_options;
        self.reader = Some(reader);
        Ok(())
    }

    /// Stamp the transport tag and forward downstream.
    pub fn queue(&mut self, mut msg: LogMessage, sink: &mut dyn MessageSink) -> Result<()> {
        msg.transport = Some(self.transport_tag);
        self.base.queue(msg, sink)
    }

    /// Read what is available and forward it.
    pub fn poll(&mut self, sink: &mut dyn MessageSink) -> Result<PollStatus> {
        self.state.check("poll", DriverState::Running)?;
        let Some(reader) = self.reader.as_mut() else {
            return Err(SourceError::InvalidTransition {
                operation: "poll",
                state: "without reader",
            });
        };

        let outcome = reader.poll(self.opener.as_ref())?;
        for msg in outcome.messages {
            self.queue(msg, sink)?;
        }
        Ok(outcome.status)
    }

    /// Poll until end of stream (with exit-on-eof) or until `shutdown` is set.
    pub async fn run(&mut self, sink: &mut dyn MessageSink, shutdown: Arc<AtomicBool>) -> Result<()> {
        let interval = self.reader_options.poll_interval();
        while !shutdown.load(Ordering::Relaxed) {
            match self.poll(sink)? {
                PollStatus::Active => tokio::task::yield_now().await,
                PollStatus::Idle => tokio::time::sleep(interval).await,
                PollStatus::Finished => break,
            }
        }
        Ok(())
    }

    /// Tear down the reader, then the base. Only valid after a successful init.
    pub fn deinit(&mut self) -> Result<()> {
        self.state.check("deinit", DriverState::Running)?;

        let saved = match self.reader.take() {
            Some(mut reader) => reader.deinit(),
            None => Ok(()),
        };
        self.base.deinit();
        self.state = DriverState::Deinitialized;

        if let Err(e) = &saved {
            log::warn!(
                "Failed to save file position, file={}, error={}",
                self.filename.display(),
                e
            );
        }
        saved
    }
}

impl Drop for FileSourceDriver {
    fn drop(&mut self) {
        if self.state == DriverState::Running {
            let _ = self.deinit();
        }
    }
}
