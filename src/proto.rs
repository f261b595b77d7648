//! Read and write protocols layered over a transport stack.
//!
//! Openers choose which protocol wraps the transport they built; the framing
//! itself lives in [`text`] and [`dgram`].

pub mod dgram;
pub mod text;

use crate::error::Result;
use crate::transport::TransportStack;
use std::fmt;

pub use dgram::DgramServer;
pub use text::{TextClient, TextServer};

/// Outcome of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// One complete message, without framing
    Message(Vec<u8>),
    /// Nothing available right now
    Again,
    /// The transport reported end of stream
    Eof,
}

/// Options shared by read protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadProtoOptions {
    /// Longer input is split into messages of at most this many bytes
    pub max_msg_size: usize,
}

impl Default for ReadProtoOptions {
    fn default() -> Self {
        Self {
            max_msg_size: 65536,
        }
    }
}

/// Options shared by write protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteProtoOptions {
    /// Bytes buffered while the transport would block before posts are refused
    pub max_pending: usize,
}

impl Default for WriteProtoOptions {
    fn default() -> Self {
        Self {
            max_pending: 1024 * 1024,
        }
    }
}

/// Source side protocol: turns transport bytes into messages.
pub trait ReadProtocol: Send + fmt::Debug {
    fn fetch(&mut self) -> Result<FetchStatus>;

    /// Input bytes fully consumed by messages returned so far
    fn consumed(&self) -> u64;

    fn transport_stack(&mut self) -> &mut TransportStack;
}

/// Destination side protocol: frames messages onto the transport.
pub trait WriteProtocol: Send + fmt::Debug {
    /// Queue one message and try to write it out
    fn post(&mut self, msg: &[u8]) -> Result<()>;

    /// Retry pending bytes; `true` once nothing is pending
    fn flush(&mut self) -> Result<bool>;

    fn pending(&self) -> usize;

    fn transport_stack(&mut self) -> &mut TransportStack;
}
