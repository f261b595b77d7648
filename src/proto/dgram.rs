//! Record-per-read protocol for sources such as `/dev/kmsg`.

use crate::error::{Result, SourceError};
use crate::proto::text::no_active_transport;
use crate::proto::{FetchStatus, ReadProtoOptions, ReadProtocol};
use crate::transport::{Transport, TransportStack};
use std::io;

/// Every successful read is exactly one message.
#[derive(Debug)]
pub struct DgramServer {
    stack: TransportStack,
    buffer: Vec<u8>,
    consumed: u64,
}

impl DgramServer {
    pub fn new(transport: Box<dyn Transport>, options: &ReadProtoOptions) -> Self {
        Self {
            stack: TransportStack::with_initial(transport),
            buffer: vec![0u8; options.max_msg_size.max(1)],
            consumed: 0,
        }
    }
}

impl ReadProtocol for DgramServer {
    fn fetch(&mut self) -> Result<FetchStatus> {
        let transport = self.stack.get_active().ok_or_else(no_active_transport)?;
        match transport.read(&mut self.buffer) {
            Ok(0) => Ok(FetchStatus::Eof),
            Ok(n) => {
                self.consumed += n as u64;
                let record = &self.buffer[..n];
                let record = record.strip_suffix(b"\n").unwrap_or(record);
                Ok(FetchStatus::Message(record.to_vec()))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(FetchStatus::Again),
            Err(e) => Err(SourceError::filesystem("read failed", e)),
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }

    fn transport_stack(&mut self) -> &mut TransportStack {
        &mut self.stack
    }
}
