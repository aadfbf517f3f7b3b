//! # Host & Endpoint Abstractions
//!
//! The manager never talks to a USB stack directly. Everything it needs from
//! the host is expressed through the traits in this module:
//!
//! - **AccessoryHost**: enumerates attached accessories and binds one
//! - **AccessoryDescriptor**: the bound link, split into a stream pair
//! - **EndpointReader / EndpointWriter**: blocking byte streams over the link
//!
//! ```text
//! AccessoryHost ──accessories()──► [Accessory, ...]
//!       │
//!       └──open_accessory(&first)──► AccessoryDescriptor
//!                                          │
//!                                    streams()
//!                                          ▼
//!                           (EndpointReader, EndpointWriter)
//! ```
//!
//! Streams build on the `embedded-io` blocking traits, so any
//! `embedded_io::Read`/`Write` implementation can back a connection.

use core::fmt::Debug;

use embedded_io::{Read, Write};

use crate::error::AdkResult;

/// Inbound half of an accessory link
pub trait EndpointReader: Read + Send {
    /// Release the stream
    ///
    /// Dropping the reader also releases it; this hook exists for streams
    /// whose release can fail and should be reported.
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Outbound half of an accessory link
pub trait EndpointWriter: Write + Send {
    /// Release the stream
    ///
    /// The manager flushes before closing when configured to, so
    /// implementations only need to release the handle.
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// An opened accessory link, as handed out by the host
pub trait AccessoryDescriptor: Send {
    /// The inbound stream type
    type Reader: EndpointReader + 'static;
    /// The outbound stream type
    type Writer: EndpointWriter + 'static;

    /// Derive the inbound/outbound stream pair from this descriptor
    ///
    /// Returns [`AdkError::DescriptorUnavailable`](crate::AdkError) when the
    /// host descriptor has no usable underlying handle.
    fn streams(&mut self) -> AdkResult<(Self::Reader, Self::Writer)>;

    /// Release the host descriptor
    fn close(&mut self) -> AdkResult<()>;
}

/// Host accessory services consumed by the manager
///
/// # Example
///
/// ```ignore
/// struct MyHost;
///
/// impl AccessoryHost for MyHost {
///     type Accessory = String;
///     type Descriptor = MyDescriptor;
///
///     fn accessories(&self) -> AdkResult<Vec<String>> {
///         Ok(vec!["demo".into()])
///     }
///
///     fn open_accessory(&self, accessory: &String) -> AdkResult<MyDescriptor> {
///         MyDescriptor::open(accessory)
///     }
/// }
/// ```
pub trait AccessoryHost: Send + Sync {
    /// Identity of an attached accessory; compared by value on detachment
    type Accessory: Clone + PartialEq + Debug + Send + Sync;
    /// Descriptor returned by a successful bind
    type Descriptor: AccessoryDescriptor + 'static;

    /// List currently attached accessories, in host order
    fn accessories(&self) -> AdkResult<Vec<Self::Accessory>>;

    /// Bind to an accessory
    ///
    /// Permission refusals must surface as
    /// [`AdkError::PermissionDenied`](crate::AdkError).
    fn open_accessory(&self, accessory: &Self::Accessory) -> AdkResult<Self::Descriptor>;
}
