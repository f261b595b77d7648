//! Fixed-size registry of transports with lazy, memoized construction.
//!
//! Each [`TransportIndex`] slot holds nothing, a registered factory, or a
//! constructed transport (with its factory retained). Once a transport has been
//! constructed into a slot it is never rebuilt for the lifetime of the stack.
//! The stack only tracks which entry point is active; layering between
//! transports is done inside the transports themselves.

use crate::transport::{Transport, TransportIndex};
use std::fmt;
use std::os::fd::RawFd;

/// Lazily builds one transport variant for a stack.
///
/// Construction happens at most once per stack and may read the stack's shared
/// descriptor or transports already constructed in other slots. Factory-owned
/// resources are released when the factory is dropped with its stack.
pub trait TransportFactory: Send + fmt::Debug {
    fn index(&self) -> TransportIndex;

    fn construct_transport(&self, stack: &TransportStack) -> Box<dyn Transport>;
}

#[derive(Debug, Default)]
struct Slot {
    factory: Option<Box<dyn TransportFactory>>,
    transport: Option<Box<dyn Transport>>,
}

impl Slot {
    fn is_populated(&self) -> bool {
        self.factory.is_some() || self.transport.is_some()
    }
}

/// Transport slots of one connection plus the active index.
///
/// Owned by a single worker; first-access construction is not synchronized.
#[derive(Debug)]
pub struct TransportStack {
    active: TransportIndex,
    fd: Option<RawFd>,
    slots: [Slot; TransportIndex::SLOTS],
}

impl Default for TransportStack {
    fn default() -> Self {
        Self {
            active: TransportIndex::Initial,
            fd: None,
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }
}

impl TransportStack {
    /// Empty stack; the active index starts at `Initial`
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack serving `initial` from the `Initial` slot, sharing its descriptor
    pub fn with_initial(initial: Box<dyn Transport>) -> Self {
        let mut stack = Self::new();
        stack.fd = initial.fd();
        stack.add_transport(TransportIndex::Initial, initial);
        stack
    }

    /// Shared descriptor of the connection
    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    pub fn active_index(&self) -> TransportIndex {
        self.active
    }

    /// Register `factory` under its own index, replacing any earlier one.
    pub fn add_factory(&mut self, factory: Box<dyn TransportFactory>) {
        match factory.index().slot() {
            Some(slot) => self.slots[slot].factory = Some(factory),
            None => log::warn!("ignoring transport factory registered without a slot"),
        }
    }

    /// Install an already constructed transport, bypassing any factory.
    pub fn add_transport(&mut self, index: TransportIndex, transport: Box<dyn Transport>) {
        match index.slot() {
            Some(slot) => self.slots[slot].transport = Some(transport),
            None => log::warn!("ignoring transport added without a slot"),
        }
    }

    /// Transport at `index`, constructing it from the registered factory on first use.
    pub fn get_transport(&mut self, index: TransportIndex) -> Option<&mut (dyn Transport + 'static)> {
        let slot = index.slot()?;

        if self.slots[slot].transport.is_none() {
            // The factory is taken out while it runs so it can borrow the stack.
            let factory = self.slots[slot].factory.take()?;
            let transport = factory.construct_transport(self);
            log::debug!(
                "constructed transport {:?} for slot {:?}",
                transport.name(),
                index
            );
            self.slots[slot].factory = Some(factory);
            self.slots[slot].transport = Some(transport);
        }

        self.slots[slot].transport.as_deref_mut()
    }

    /// Already constructed transport at `index`; never invokes a factory
    pub fn transport(&self, index: TransportIndex) -> Option<&dyn Transport> {
        let slot = index.slot()?;
        self.slots[slot].transport.as_deref()
    }

    pub fn has_factory(&self, index: TransportIndex) -> bool {
        index
            .slot()
            .map_or(false, |slot| self.slots[slot].factory.is_some())
    }

    pub fn get_active(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.get_transport(self.active)
    }

    /// Make `index` active if it has a transport or a factory.
    ///
    /// No handshake happens here; callers switch once the layer is ready.
    pub fn switch(&mut self, index: TransportIndex) -> bool {
        let populated = index
            .slot()
            .map_or(false, |slot| self.slots[slot].is_populated());

        if populated {
            log::debug!("switching active transport {:?} -> {:?}", self.active, index);
            self.active = index;
        }
        populated
    }
}
