//! # Accessory Connection Manager
//!
//! [`AdkManager`] owns one accessory connection at a time: the bound
//! accessory, its host descriptor and the inbound/outbound stream pair.
//!
//! ## State Machine
//!
//! ```text
//!            open() ok
//!   ┌────────┐ ───────────────► ┌────────┐ ──┐ read()/write()
//!   │ Closed │                  │  Open  │ ◄─┘
//!   └────────┘ ◄─────────────── └────────┘
//!        close() / matching detachment
//! ```
//!
//! `open()` while `Open` fails without touching the live connection.
//!
//! ## Locking
//!
//! The four owned resources live in one slot behind a single mutex, so
//! opening and closing are atomic swaps of that slot. Opens are serialized
//! by a separate lock and the slot lock is not held while the host looks up
//! and binds the accessory, so state queries and detachment stay responsive
//! during a slow bind. Each stream sits in
//! its own reference-counted lock: a read blocked on the accessory keeps its
//! stream alive, and a concurrent close swaps the slot to `Closed` without
//! waiting for it.
//!
//! ## Failure Policy
//!
//! - `read` propagates I/O failures
//! - `write_*` log and suppress failures, counting them in [`WriteStats`]
//! - `close` attempts every release step and only logs failures
//! - `open` folds failures into `false`; `try_open` reports them

use core::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use embedded_io::{Read, Write};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::detach::{DetachFilter, DetachListener};
use crate::error::{AdkError, AdkResult};
use crate::message::AdkMessage;
use crate::traits::{AccessoryDescriptor, AccessoryHost, EndpointReader, EndpointWriter};
use crate::{ACTION_USB_ACCESSORY_DETACHED, BUFFER_SIZE};

/// Room for the longest decimal rendering of an `f32`
const FLOAT_TEXT_CAPACITY: usize = 64;

/// Magnitudes in `[PLAIN_MIN, PLAIN_MAX)` are written without an exponent
const PLAIN_MIN: f32 = 1e-3;
const PLAIN_MAX: f32 = 1e7;

type ReaderOf<H> = <<H as AccessoryHost>::Descriptor as AccessoryDescriptor>::Reader;
type WriterOf<H> = <<H as AccessoryHost>::Descriptor as AccessoryDescriptor>::Writer;

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Host notification action that signals accessory detachment
    pub detached_action: String,
    /// Flush the outbound stream before releasing it on close
    pub flush_on_close: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            detached_action: ACTION_USB_ACCESSORY_DETACHED.to_string(),
            flush_on_close: true,
        }
    }
}

/// Connection state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Closed,
    Open,
}

/// Counters for best-effort writes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    /// Writes that reached the accessory and were flushed
    pub writes: u64,
    /// Total bytes of successful writes
    pub bytes_written: u64,
    /// Writes whose failure was suppressed
    pub failures: u64,
}

/// Serializable snapshot of the manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub state: LinkState,
    pub serial_available: bool,
    pub write_stats: WriteStats,
    pub last_write_error: Option<String>,
}

#[derive(Default)]
struct WriteLog {
    stats: WriteStats,
    last_error: Option<AdkError>,
}

struct Inbound<R> {
    stream: Mutex<R>,
    exhausted: AtomicBool,
}

/// The four resources owned while a connection is open
struct Connection<H: AccessoryHost> {
    accessory: H::Accessory,
    descriptor: H::Descriptor,
    inbound: Arc<Inbound<ReaderOf<H>>>,
    outbound: Arc<Mutex<WriterOf<H>>>,
}

pub(crate) struct Shared<H: AccessoryHost> {
    host: H,
    config: ManagerConfig,
    opening: Mutex<()>,
    link: Mutex<Option<Connection<H>>>,
    writes: Mutex<WriteLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<H: AccessoryHost> Shared<H> {
    pub(crate) fn close(&self) {
        let taken = lock(&self.link).take();
        match taken {
            Some(connection) => self.release(connection),
            None => debug!("close() on a closed manager"),
        }
    }

    pub(crate) fn notify_detached(&self, accessory: Option<&H::Accessory>) -> bool {
        let Some(accessory) = accessory else {
            debug!("Detachment without accessory ignored");
            return false;
        };

        let taken = {
            let mut link = lock(&self.link);
            match link.as_ref() {
                Some(connection) if connection.accessory == *accessory => link.take(),
                _ => None,
            }
        };

        match taken {
            Some(connection) => {
                info!("Bound accessory {:?} detached", accessory);
                self.release(connection);
                true
            }
            None => {
                debug!("Detachment of unbound accessory {:?} ignored", accessory);
                false
            }
        }
    }

    /// Release every part of a connection, each step independently
    fn release(&self, connection: Connection<H>) {
        let Connection {
            accessory,
            mut descriptor,
            inbound,
            outbound,
        } = connection;

        if let Err(e) = descriptor.close() {
            warn!("Failed to close accessory descriptor: {}", e);
        }

        match inbound.stream.try_lock() {
            Ok(mut reader) => close_reader(&mut *reader),
            Err(TryLockError::Poisoned(poisoned)) => close_reader(&mut *poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                debug!("Inbound stream busy, released when the pending read returns")
            }
        }

        match outbound.try_lock() {
            Ok(mut writer) => self.close_writer(&mut *writer),
            Err(TryLockError::Poisoned(poisoned)) => {
                self.close_writer(&mut *poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => {
                debug!("Outbound stream busy, released when the pending write returns")
            }
        }

        info!("Closed accessory {:?}", accessory);
    }

    fn close_writer(&self, writer: &mut WriterOf<H>) {
        if self.config.flush_on_close {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush outbound stream: {:?}", e);
            }
        }
        if let Err(e) = writer.close() {
            warn!("Failed to close outbound stream: {:?}", e);
        }
    }
}

fn close_reader<R: EndpointReader>(reader: &mut R) {
    if let Err(e) = reader.close() {
        warn!("Failed to close inbound stream: {:?}", e);
    }
}

/// Manages a single USB accessory connection
///
/// Cloning yields another handle to the same connection, so one clone can
/// sit in a reader thread while another serves writes and detachment.
///
/// # Example
///
/// ```ignore
/// let manager = AdkManager::new(host);
/// if manager.open() {
///     manager.write_text("PING");
///     let reply = manager.read()?;
///     println!("{:?}", reply.bytes());
/// }
/// manager.close();
/// ```
pub struct AdkManager<H: AccessoryHost> {
    shared: Arc<Shared<H>>,
}

impl<H: AccessoryHost> Clone for AdkManager<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: AccessoryHost> AdkManager<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, ManagerConfig::default())
    }

    pub fn with_config(host: H, config: ManagerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                config,
                opening: Mutex::new(()),
                link: Mutex::new(None),
                writes: Mutex::new(WriteLog::default()),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.shared.host
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Open the first attached accessory
    ///
    /// Returns `false` if a connection is already open, nothing is attached,
    /// access is denied or the host hands out no descriptor. Use
    /// [`try_open`](Self::try_open) to tell these apart.
    pub fn open(&self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(AdkError::AlreadyOpen) => {
                debug!("open() while already open");
                false
            }
            Err(AdkError::PermissionDenied) => {
                error!("Permission denied opening accessory");
                false
            }
            Err(e) => {
                warn!("Failed to open accessory: {}", e);
                false
            }
        }
    }

    /// Open the first attached accessory, reporting why it failed
    pub fn try_open(&self) -> AdkResult<()> {
        let _opening = lock(&self.shared.opening);
        if self.is_open() {
            return Err(AdkError::AlreadyOpen);
        }

        let accessory = self
            .shared
            .host
            .accessories()?
            .into_iter()
            .next()
            .ok_or(AdkError::NoAccessory)?;

        let mut descriptor = self.shared.host.open_accessory(&accessory)?;
        let (reader, writer) = match descriptor.streams() {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(close_err) = descriptor.close() {
                    warn!("Failed to close unusable descriptor: {}", close_err);
                }
                return Err(e);
            }
        };

        info!("Opened accessory {:?}", accessory);
        // Only opens fill the slot and they hold `opening`, so it is still empty
        *lock(&self.shared.link) = Some(Connection {
            accessory,
            descriptor,
            inbound: Arc::new(Inbound {
                stream: Mutex::new(reader),
                exhausted: AtomicBool::new(false),
            }),
            outbound: Arc::new(Mutex::new(writer)),
        });
        Ok(())
    }

    /// Close the connection, releasing descriptor and streams
    ///
    /// Never fails; release failures are logged. No-op when closed.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared.link).is_some()
    }

    pub fn state(&self) -> LinkState {
        if self.is_open() {
            LinkState::Open
        } else {
            LinkState::Closed
        }
    }

    /// Whether the inbound stream is open and has not reached end of stream
    pub fn serial_available(&self) -> bool {
        lock(&self.shared.link)
            .as_ref()
            .is_some_and(|c| !c.inbound.exhausted.load(Ordering::Acquire))
    }

    /// Blocking read of at most [`BUFFER_SIZE`] bytes
    ///
    /// Returns exactly the bytes one read delivered, or the end-of-stream
    /// marker. Calling this on a closed manager is a caller error and yields
    /// [`AdkError::NotOpen`].
    pub fn read(&self) -> AdkResult<AdkMessage> {
        let inbound = lock(&self.shared.link)
            .as_ref()
            .map(|c| Arc::clone(&c.inbound))
            .ok_or(AdkError::NotOpen)?;

        let mut buffer = [0u8; BUFFER_SIZE];
        let read = lock(&inbound.stream).read(&mut buffer);
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                error!("Accessory read failed: {:?}", e);
                return Err(AdkError::from_io(&e));
            }
        };

        if n == 0 {
            inbound.exhausted.store(true, Ordering::Release);
            debug!("Accessory reached end of stream");
            return Ok(AdkMessage::end_of_stream());
        }

        debug!("Read {} bytes from accessory", n);
        AdkMessage::from_slice(&buffer[..n])
    }

    /// Write `bytes` and flush, reporting failure
    pub fn try_write(&self, bytes: &[u8]) -> AdkResult<()> {
        let outbound = lock(&self.shared.link)
            .as_ref()
            .map(|c| Arc::clone(&c.outbound))
            .ok_or(AdkError::NotOpen)?;

        let mut writer = lock(&outbound);
        writer.write_all(bytes).map_err(|e| AdkError::from_io(&e))?;
        writer.flush().map_err(|e| AdkError::from_io(&e))
    }

    /// Write `bytes` and flush; failures are logged and counted
    pub fn write_bytes(&self, bytes: &[u8]) {
        let result = self.try_write(bytes);
        self.record_write(bytes.len(), result);
    }

    /// Write exactly one byte
    pub fn write_byte(&self, value: u8) {
        self.write_bytes(&[value]);
    }

    /// Write the low byte of `value`
    pub fn write_int(&self, value: i32) {
        self.write_bytes(&[value as u8]);
    }

    /// Write the decimal text form of `value`
    pub fn write_float(&self, value: f32) {
        match float_text(value) {
            Ok(text) => self.write_text(&text),
            Err(e) => self.record_write(0, Err(e)),
        }
    }

    /// Write the UTF-8 bytes of `text`
    pub fn write_text(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    pub fn write_stats(&self) -> WriteStats {
        lock(&self.shared.writes).stats
    }

    /// Most recent suppressed write failure
    pub fn last_write_error(&self) -> Option<AdkError> {
        lock(&self.shared.writes).last_error
    }

    pub fn status(&self) -> ManagerStatus {
        let (write_stats, last_write_error) = {
            let log = lock(&self.shared.writes);
            (log.stats, log.last_error.map(|e| e.to_string()))
        };
        ManagerStatus {
            state: self.state(),
            serial_available: self.serial_available(),
            write_stats,
            last_write_error,
        }
    }

    /// Filter describing the host notifications the listener handles
    pub fn detached_filter(&self) -> DetachFilter {
        DetachFilter::new(self.shared.config.detached_action.clone())
    }

    /// Listener to register with the host's notification dispatcher
    pub fn detach_listener(&self) -> DetachListener<H> {
        DetachListener::new(Arc::downgrade(&self.shared), self.detached_filter())
    }

    /// Host-side entry point for a detachment event
    ///
    /// Closes the connection iff `accessory` equals the bound accessory.
    /// Returns whether a connection was closed.
    pub fn notify_detached(&self, accessory: Option<&H::Accessory>) -> bool {
        self.shared.notify_detached(accessory)
    }

    fn record_write(&self, len: usize, result: AdkResult<()>) {
        let mut log = lock(&self.shared.writes);
        match result {
            Ok(()) => {
                log.stats.writes += 1;
                log.stats.bytes_written += len as u64;
            }
            Err(e) => {
                warn!("Write of {} bytes to accessory failed: {}", len, e);
                log.stats.failures += 1;
                log.last_error = Some(e);
            }
        }
    }
}

/// Text for a float in the `1.0` / `3.14` / `1.0E7` / `Infinity` style
///
/// Digits are the shortest that round-trip. Magnitudes outside
/// `[1e-3, 1e7)` use `d.dddE<exp>`; both forms keep at least one
/// fractional digit.
fn float_text(value: f32) -> AdkResult<heapless::String<FLOAT_TEXT_CAPACITY>> {
    let mut text = heapless::String::new();
    let magnitude = value.abs();
    if value.is_nan() {
        text.push_str("NaN").map_err(|_| AdkError::Format)?;
    } else if value.is_infinite() {
        let s = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.push_str(s).map_err(|_| AdkError::Format)?;
    } else if magnitude != 0.0 && !(PLAIN_MIN..PLAIN_MAX).contains(&magnitude) {
        let mut scientific: heapless::String<FLOAT_TEXT_CAPACITY> = heapless::String::new();
        write!(scientific, "{:e}", value).map_err(|_| AdkError::Format)?;
        let (mantissa, exponent) = scientific.split_once('e').ok_or(AdkError::Format)?;
        text.push_str(mantissa).map_err(|_| AdkError::Format)?;
        if !mantissa.contains('.') {
            text.push_str(".0").map_err(|_| AdkError::Format)?;
        }
        text.push('E').map_err(|_| AdkError::Format)?;
        text.push_str(exponent).map_err(|_| AdkError::Format)?;
    } else {
        write!(text, "{}", value).map_err(|_| AdkError::Format)?;
        if !text.contains('.') {
            text.push_str(".0").map_err(|_| AdkError::Format)?;
        }
    }
    Ok(text)
}
