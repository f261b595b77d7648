//! # filesrc - Local Log Source Drivers
//!
//! Reads log messages from local resources: regular files (followed across
//! growth and rotation), character devices, the Linux kernel message buffers
//! and named pipes. Named pipes can also be written to as a destination.
//!
//! ## Architecture
//!
//! - [`transport`] - Byte transports over a descriptor and the lazily built transport stack
//! - [`proto`] - Message framing on top of a transport
//! - [`opener`] - Per-resource strategies for preparing and opening paths
//! - [`reader`] - Turns protocol output into messages, follows files, restores offsets
//! - [`driver`] - Source and destination drivers tying it all together
//! - [`config`] / [`persist`] - Global configuration and saved reader positions
//! - [`error`] - Centralized error types

// Core modules
pub mod config;
pub mod error;
pub mod message;
pub mod persist;

// I/O layers
pub mod opener;
pub mod proto;
pub mod transport;

// Drivers
pub mod driver;
pub mod reader;

// Re-export commonly used types for convenience
pub use config::{ConfigVersion, GlobalConfig};
pub use driver::{DriverState, FileSourceDriver, PipeDestinationDriver};
pub use error::{Result, SourceError};
pub use message::{LogMessage, MessageSink, TransportTag};
pub use opener::{FileDirection, FileOpener, FileOpenerOptions, OpenerKind};
pub use transport::{Transport, TransportIndex, TransportStack};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
