//! In-memory host used by the unit tests.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use embedded_io::{ErrorKind, ErrorType, Read, Write};

use crate::error::{AdkError, AdkResult};
use crate::traits::{AccessoryDescriptor, AccessoryHost, EndpointReader, EndpointWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub ErrorKind);

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// What one call to `read` produces
#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Fail(ErrorKind),
}

/// Everything observable on the outbound side and the descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Write(Vec<u8>),
    Flush,
    WriterClosed,
    ReaderClosed,
    DescriptorClosed,
}

#[derive(Default)]
pub struct Wire {
    pub events: Mutex<Vec<WireEvent>>,
}

impl Wire {
    pub fn events(&self) -> Vec<WireEvent> {
        self.events.lock().unwrap().clone()
    }

    /// All bytes written, in order
    pub fn written(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WireEvent::Write(b) => Some(b),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn push(&self, event: WireEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct MockReader {
    steps: VecDeque<ReadStep>,
    gate: Option<(Sender<()>, Receiver<ReadStep>)>,
    wire: Arc<Wire>,
    fail_close: bool,
}

impl ErrorType for MockReader {
    type Error = MockError;
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let step = match &self.gate {
            Some((started, rx)) => {
                let _ = started.send(());
                rx.recv().unwrap_or(ReadStep::Eof)
            }
            None => self.steps.pop_front().unwrap_or(ReadStep::Eof),
        };
        match step {
            ReadStep::Data(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            ReadStep::Eof => Ok(0),
            ReadStep::Fail(kind) => Err(MockError(kind)),
        }
    }
}

impl EndpointReader for MockReader {
    fn close(&mut self) -> Result<(), Self::Error> {
        self.wire.push(WireEvent::ReaderClosed);
        if self.fail_close {
            return Err(MockError(ErrorKind::Other));
        }
        Ok(())
    }
}

pub struct MockWriter {
    wire: Arc<Wire>,
    fail_writes: bool,
}

impl ErrorType for MockWriter {
    type Error = MockError;
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(MockError(ErrorKind::BrokenPipe));
        }
        self.wire.push(WireEvent::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockError(ErrorKind::BrokenPipe));
        }
        self.wire.push(WireEvent::Flush);
        Ok(())
    }
}

impl EndpointWriter for MockWriter {
    fn close(&mut self) -> Result<(), Self::Error> {
        self.wire.push(WireEvent::WriterClosed);
        Ok(())
    }
}

pub struct MockDescriptor {
    streams: Option<(MockReader, MockWriter)>,
    wire: Arc<Wire>,
    fail_close: bool,
}

impl AccessoryDescriptor for MockDescriptor {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn streams(&mut self) -> AdkResult<(MockReader, MockWriter)> {
        self.streams.take().ok_or(AdkError::DescriptorUnavailable)
    }

    fn close(&mut self) -> AdkResult<()> {
        self.wire.push(WireEvent::DescriptorClosed);
        if self.fail_close {
            return Err(AdkError::Io(ErrorKind::Other));
        }
        Ok(())
    }
}

/// Scripted host; every knob applies to the next bind
#[derive(Default)]
pub struct MockHost {
    pub attached: Mutex<Vec<&'static str>>,
    pub bind_error: Mutex<Option<AdkError>>,
    pub no_fd: Mutex<bool>,
    pub reads: Mutex<Vec<ReadStep>>,
    pub gate: Mutex<Option<(Sender<()>, Receiver<ReadStep>)>>,
    /// Holds the next `accessories()` call until released
    pub list_gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    pub fail_writes: Mutex<bool>,
    pub fail_close: Mutex<bool>,
    pub binds: Mutex<Vec<&'static str>>,
    pub wire: Arc<Wire>,
}

impl MockHost {
    pub fn with_accessories(names: &[&'static str]) -> Self {
        let host = Self::default();
        *host.attached.lock().unwrap() = names.to_vec();
        host
    }

    pub fn script_reads(&self, steps: Vec<ReadStep>) {
        *self.reads.lock().unwrap() = steps;
    }
}

impl AccessoryHost for MockHost {
    type Accessory = &'static str;
    type Descriptor = MockDescriptor;

    fn accessories(&self) -> AdkResult<Vec<&'static str>> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some((started, release)) = gate {
            let _ = started.send(());
            let _ = release.recv();
        }
        Ok(self.attached.lock().unwrap().clone())
    }

    fn open_accessory(&self, accessory: &&'static str) -> AdkResult<MockDescriptor> {
        if let Some(err) = *self.bind_error.lock().unwrap() {
            return Err(err);
        }
        self.binds.lock().unwrap().push(*accessory);

        let fail_close = *self.fail_close.lock().unwrap();
        let reader = MockReader {
            steps: self.reads.lock().unwrap().drain(..).collect(),
            gate: self.gate.lock().unwrap().take(),
            wire: Arc::clone(&self.wire),
            fail_close,
        };
        let writer = MockWriter {
            wire: Arc::clone(&self.wire),
            fail_writes: *self.fail_writes.lock().unwrap(),
        };
        let streams = if *self.no_fd.lock().unwrap() {
            None
        } else {
            Some((reader, writer))
        };
        Ok(MockDescriptor {
            streams,
            wire: Arc::clone(&self.wire),
            fail_close,
        })
    }
}
