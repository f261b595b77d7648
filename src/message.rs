//! Messages produced by source drivers and the sinks they are forwarded to.

use crate::error::{Result, SourceError};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Provenance marker stamped on every message a driver forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportTag {
    File,
    Device,
    DevKmsg,
    ProcKmsg,
    Pipe,
}

impl TransportTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "local+file",
            Self::Device => "local+device",
            Self::DevKmsg => "local+devkmsg",
            Self::ProcKmsg => "local+prockmsg",
            Self::Pipe => "local+pipe",
        }
    }
}

impl fmt::Display for TransportTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message read from a local source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub payload: String,
    pub file_name: String,
    pub transport: Option<TransportTag>,
}

impl LogMessage {
    pub fn new(payload: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            file_name: file_name.into(),
            transport: None,
        }
    }

    /// Build a message from raw protocol bytes, replacing invalid UTF-8
    pub fn from_bytes(bytes: &[u8], file_name: &str) -> Self {
        Self::new(String::from_utf8_lossy(bytes), file_name)
    }
}

/// Downstream consumer of tagged messages.
pub trait MessageSink: Send {
    fn forward(&mut self, msg: LogMessage) -> Result<()>;
}

impl MessageSink for Vec<LogMessage> {
    fn forward(&mut self, msg: LogMessage) -> Result<()> {
        self.push(msg);
        Ok(())
    }
}

impl MessageSink for UnboundedSender<LogMessage> {
    fn forward(&mut self, msg: LogMessage) -> Result<()> {
        self.send(msg).map_err(|_| SourceError::DownstreamClosed)
    }
}
