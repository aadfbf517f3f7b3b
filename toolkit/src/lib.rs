//! # ADK Toolkit
//!
//! This crate lets applications exchange raw bytes with an attached USB
//! accessory (Android Open Accessory / ADK) without touching the host's USB
//! manager, file descriptors or detachment notifications directly:
//!
//! - **AdkManager**: opens the first attached accessory, blocking read/write,
//!   clean close on request or detachment
//! - **AdkMessage**: one read chunk (at most 255 bytes) or end of stream
//! - **Host traits**: the seam between the manager and a concrete USB stack
//!
//! ## Architecture
//!
//! ```text
//! Application ──► AdkManager ──► AccessoryHost ──► descriptor
//!                    │  ▲                             │
//!                    │  └── DetachListener ◄── host notifications
//!                    ▼
//!        EndpointReader / EndpointWriter (embedded-io)
//! ```
//!
//! Bytes are opaque: there is no framing, no retry and no buffering beyond a
//! single fixed-size read chunk.

pub mod detach;
pub mod devnode;
pub mod error;
pub mod manager;
pub mod message;
pub mod stream;
pub mod traits;

#[cfg(test)]
mod mock;

// Re-export main types for convenience
pub use detach::{DetachFilter, DetachListener};
pub use devnode::{DevNodeAccessory, DevNodeHost};
pub use error::{AdkError, AdkResult};
pub use manager::{AdkManager, LinkState, ManagerConfig, ManagerStatus, WriteStats};
pub use message::AdkMessage;
pub use stream::{FdStream, OwnedDescriptor};
pub use traits::{AccessoryDescriptor, AccessoryHost, EndpointReader, EndpointWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest chunk returned by a single read
pub const BUFFER_SIZE: usize = 255;

/// Android broadcast action sent when an accessory is detached
pub const ACTION_USB_ACCESSORY_DETACHED: &str =
    "android.hardware.usb.action.USB_ACCESSORY_DETACHED";
