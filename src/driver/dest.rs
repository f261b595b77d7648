//! `pipe()` destination: writes messages into a named pipe.

use crate::config::GlobalConfig;
use crate::driver::DriverState;
use crate::error::{Result, SourceError};
use crate::message::LogMessage;
use crate::opener::{FileDirection, FileOpener, FileOpenerOptions, NamedPipeOpener};
use crate::proto::{WriteProtoOptions, WriteProtocol};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PipeDestinationDriver {
    filename: PathBuf,
    opener: NamedPipeOpener,
    opener_options: FileOpenerOptions,
    proto_options: WriteProtoOptions,
    writer: Option<Box<dyn WriteProtocol>>,
    state: DriverState,
}

impl PipeDestinationDriver {
    /// The path is used literally; a missing FIFO is created on init.
    pub fn new(path: impl AsRef<Path>, _cfg: &GlobalConfig) -> Self {
        Self {
            filename: path.as_ref().to_path_buf(),
            opener: NamedPipeOpener::new(false),
            opener_options: FileOpenerOptions::default(),
            proto_options: WriteProtoOptions::default(),
            writer: None,
            state: DriverState::Configured,
        }
    }

    pub fn set_create_dirs(&mut self, create_dirs: bool) {
        self.opener_options.create_dirs = create_dirs;
    }

    pub fn set_max_pending(&mut self, max_pending: usize) {
        self.proto_options.max_pending = max_pending;
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn init(&mut self, cfg: &GlobalConfig) -> Result<()> {
        if self.state != DriverState::Configured {
            return Err(SourceError::InvalidTransition {
                operation: "init",
                state: self.state.name(),
            });
        }

        let mut options = self.opener_options.clone();
        options.init(cfg);
        self.opener.set_options(options);

        let fd = self
            .opener
            .open(&self.filename, FileDirection::Write)
            .map_err(|e| SourceError::initialization("pipe destination", e))?;
        let transport = self.opener.construct_transport(fd);
        self.writer = Some(
            self.opener
                .construct_write_protocol(transport, &self.proto_options),
        );
        self.state = DriverState::Running;
        Ok(())
    }

    fn writer(&mut self, operation: &'static str) -> Result<&mut Box<dyn WriteProtocol>> {
        let state = self.state;
        self.writer.as_mut().ok_or(SourceError::InvalidTransition {
            operation,
            state: state.name(),
        })
    }

    /// Write one message; it stays pending while the reader side is full.
    pub fn queue(&mut self, msg: &LogMessage) -> Result<()> {
        self.writer("queue")?.post(msg.payload.as_bytes())
    }

    /// Retry pending bytes; `true` once everything was written
    pub fn flush(&mut self) -> Result<bool> {
        self.writer("flush")?.flush()
    }

    pub fn pending(&self) -> usize {
        self.writer.as_ref().map_or(0, |w| w.pending())
    }

    pub fn deinit(&mut self) -> Result<()> {
        if self.state != DriverState::Running {
            return Err(SourceError::InvalidTransition {
                operation: "deinit",
                state: self.state.name(),
            });
        }
        if let Some(mut writer) = self.writer.take() {
            match writer.flush() {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "Dropping unwritten output, file={}, pending={}",
                    self.filename.display(),
                    writer.pending()
                ),
                Err(e) => log::warn!(
                    "Error flushing pipe destination, file={}, error={}",
                    self.filename.display(),
                    e
                ),
            }
        }
        self.state = DriverState::Deinitialized;
        Ok(())
    }
}
