//! Newline-framed text protocol.

use crate::error::{Result, SourceError};
use crate::proto::{FetchStatus, ReadProtoOptions, ReadProtocol, WriteProtoOptions, WriteProtocol};
use crate::transport::{Transport, TransportStack};
use std::io;

const READ_CHUNK: usize = 8192;

pub(crate) fn no_active_transport() -> SourceError {
    SourceError::filesystem("no active transport", io::ErrorKind::NotConnected.into())
}

/// Splits the incoming byte stream on `\n`.
///
/// A trailing partial line is kept buffered across end-of-stream so a growing
/// file can complete it later; `consumed` never includes it.
#[derive(Debug)]
pub struct TextServer {
    stack: TransportStack,
    buffer: Vec<u8>,
    consumed: u64,
    max_msg_size: usize,
}

impl TextServer {
    pub fn new(transport: Box<dyn Transport>, options: &ReadProtoOptions) -> Self {
        Self {
            stack: TransportStack::with_initial(transport),
            buffer: Vec::new(),
            consumed: 0,
            max_msg_size: options.max_msg_size.max(1),
        }
    }

    /// Bytes read but not yet part of a complete message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn take_message(&mut self, len: usize, framing: usize) -> FetchStatus {
        let mut message: Vec<u8> = self.buffer.drain(..len + framing).collect();
        message.truncate(len);
        if message.last() == Some(&b'\r') {
            message.pop();
        }
        self.consumed += (len + framing) as u64;
        FetchStatus::Message(message)
    }
}

impl ReadProtocol for TextServer {
    fn fetch(&mut self) -> Result<FetchStatus> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(pos) = memchr::memchr(b'\n', &self.buffer) {
                if pos <= self.max_msg_size {
                    return Ok(self.take_message(pos, 1));
                }
            }
            if self.buffer.len() >= self.max_msg_size {
                return Ok(self.take_message(self.max_msg_size, 0));
            }

            let transport = self.stack.get_active().ok_or_else(no_active_transport)?;
            match transport.read(&mut chunk) {
                Ok(0) => return Ok(FetchStatus::Eof),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(FetchStatus::Again),
                Err(e) => return Err(SourceError::filesystem("read failed", e)),
            }
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }

    fn transport_stack(&mut self) -> &mut TransportStack {
        &mut self.stack
    }
}

/// Writes each posted message followed by `\n`.
#[derive(Debug)]
pub struct TextClient {
    stack: TransportStack,
    pending: Vec<u8>,
    max_pending: usize,
}

impl TextClient {
    pub fn new(transport: Box<dyn Transport>, options: &WriteProtoOptions) -> Self {
        Self {
            stack: TransportStack::with_initial(transport),
            pending: Vec::new(),
            max_pending: options.max_pending,
        }
    }
}

impl WriteProtocol for TextClient {
    fn post(&mut self, msg: &[u8]) -> Result<()> {
        if self.pending.len() + msg.len() + 1 > self.max_pending {
            return Err(SourceError::filesystem(
                "destination is not draining, message dropped",
                io::ErrorKind::WouldBlock.into(),
            ));
        }
        self.pending.extend_from_slice(msg);
        self.pending.push(b'\n');
        self.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<bool> {
        while !self.pending.is_empty() {
            let transport = self.stack.get_active().ok_or_else(no_active_transport)?;
            match transport.write(&self.pending) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(SourceError::filesystem("write failed", e)),
            }
        }
        Ok(self.pending.is_empty())
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn transport_stack(&mut self) -> &mut TransportStack {
        &mut self.stack
    }
}
