//! Blocking byte streams over a host file descriptor.
//!
//! Both host backends end up with a plain file handle for the accessory
//! link. [`FdStream`] adapts it to the `embedded-io` traits the manager works
//! with; [`FdStream::pair`] splits one handle into independent inbound and
//! outbound streams.

use std::fs::File;
use std::io;

use embedded_io::{ErrorType, Read, Write};

use crate::error::{AdkError, AdkResult};
use crate::traits::{AccessoryDescriptor, EndpointReader, EndpointWriter};

/// One direction of an accessory link backed by a file handle
#[derive(Debug)]
pub struct FdStream {
    file: File,
}

impl FdStream {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Split one handle into an inbound and an outbound stream
    ///
    /// Each stream owns a duplicate of the handle, so either can be released
    /// without invalidating the other.
    pub fn pair(file: &File) -> io::Result<(FdStream, FdStream)> {
        let inbound = file.try_clone()?;
        let outbound = file.try_clone()?;
        Ok((FdStream::new(inbound), FdStream::new(outbound)))
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

impl ErrorType for FdStream {
    type Error = io::Error;
}

impl Read for FdStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        loop {
            match io::Read::read(&mut self.file, buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl Write for FdStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let written = io::Write::write(&mut self.file, buf)?;
        if written == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        io::Write::flush(&mut self.file)
    }
}

impl EndpointReader for FdStream {}

impl EndpointWriter for FdStream {}

/// Host descriptor that owns a file handle
///
/// Streams are duplicates of the handle; closing the descriptor releases
/// only the original.
#[derive(Debug)]
pub struct OwnedDescriptor {
    file: Option<File>,
}

impl OwnedDescriptor {
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl AccessoryDescriptor for OwnedDescriptor {
    type Reader = FdStream;
    type Writer = FdStream;

    fn streams(&mut self) -> AdkResult<(FdStream, FdStream)> {
        let file = self.file.as_ref().ok_or(AdkError::DescriptorUnavailable)?;
        FdStream::pair(file).map_err(|e| AdkError::from_io(&e))
    }

    fn close(&mut self) -> AdkResult<()> {
        self.file.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::ErrorKind;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn test_pair_reads_and_writes_same_file() {
        let mut file = tempfile::tempfile().unwrap();
        io::Write::write_all(&mut file, b"PONG").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let (mut inbound, _outbound) = FdStream::pair(&file).unwrap();
        let mut buf = [0u8; 16];
        let n = inbound.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"PONG");
        assert_eq!(inbound.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_then_flush() {
        let file = tempfile::tempfile().unwrap();
        let (_inbound, mut outbound) = FdStream::pair(&file).unwrap();
        outbound.write_all(b"PING").unwrap();
        outbound.flush().unwrap();

        let mut contents = Vec::new();
        let mut file = outbound.into_inner();
        file.seek(SeekFrom::Start(0)).unwrap();
        io::Read::read_to_end(&mut file, &mut contents).unwrap();
        assert_eq!(contents, b"PING");
    }

    #[test]
    fn test_closed_descriptor_has_no_streams() {
        let mut descriptor = OwnedDescriptor::new(tempfile::tempfile().unwrap());
        assert!(descriptor.streams().is_ok());
        descriptor.close().unwrap();
        assert_eq!(
            descriptor.streams().err(),
            Some(AdkError::DescriptorUnavailable)
        );
    }

    #[test]
    fn test_error_kind_mapping() {
        let kind = |k: io::ErrorKind| AdkError::from_io(&io::Error::from(k));
        assert_eq!(
            kind(io::ErrorKind::PermissionDenied),
            AdkError::Io(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            kind(io::ErrorKind::ConnectionReset),
            AdkError::Io(ErrorKind::ConnectionReset)
        );
        assert_eq!(
            kind(io::ErrorKind::Unsupported),
            AdkError::Io(ErrorKind::Unsupported)
        );
        assert_eq!(
            kind(io::ErrorKind::OutOfMemory),
            AdkError::Io(ErrorKind::OutOfMemory)
        );
    }
}
