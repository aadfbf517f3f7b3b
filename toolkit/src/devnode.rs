//! Accessory host backed by a device node.
//!
//! On Linux devices running the accessory gadget function the kernel exposes
//! the accessory link as a character device (`/dev/usb_accessory`). The node
//! existing means an accessory is attached; opening it read/write binds it.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{AdkError, AdkResult};
use crate::stream::OwnedDescriptor;
use crate::traits::AccessoryHost;

/// Node created by the kernel accessory gadget driver
pub const DEFAULT_ACCESSORY_NODE: &str = "/dev/usb_accessory";

/// An accessory identified by its device node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevNodeAccessory {
    path: PathBuf,
}

impl DevNodeAccessory {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Host that finds and opens the accessory through a device node
#[derive(Debug, Clone)]
pub struct DevNodeHost {
    node: PathBuf,
}

impl DevNodeHost {
    pub fn new(node: impl Into<PathBuf>) -> Self {
        Self { node: node.into() }
    }
}

impl Default for DevNodeHost {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESSORY_NODE)
    }
}

fn bind_error(err: io::Error) -> AdkError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => AdkError::PermissionDenied,
        io::ErrorKind::NotFound => AdkError::NoAccessory,
        _ => AdkError::from_io(&err),
    }
}

impl AccessoryHost for DevNodeHost {
    type Accessory = DevNodeAccessory;
    type Descriptor = OwnedDescriptor;

    fn accessories(&self) -> AdkResult<Vec<DevNodeAccessory>> {
        if self.node.exists() {
            Ok(vec![DevNodeAccessory {
                path: self.node.clone(),
            }])
        } else {
            debug!("Accessory node {} not present", self.node.display());
            Ok(Vec::new())
        }
    }

    fn open_accessory(&self, accessory: &DevNodeAccessory) -> AdkResult<OwnedDescriptor> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&accessory.path)
            .map_err(bind_error)?;
        Ok(OwnedDescriptor::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdkManager;
    use std::io::Write as _;

    #[test]
    fn test_missing_node_means_no_accessory() {
        let dir = tempfile::tempdir().unwrap();
        let host = DevNodeHost::new(dir.path().join("usb_accessory"));
        assert!(host.accessories().unwrap().is_empty());

        let manager = AdkManager::new(host);
        assert_eq!(manager.try_open(), Err(AdkError::NoAccessory));
    }

    #[test]
    fn test_open_read_write_close() {
        let mut node = tempfile::NamedTempFile::new().unwrap();
        node.write_all(b"PONG").unwrap();
        node.flush().unwrap();

        let manager = AdkManager::new(DevNodeHost::new(node.path()));
        assert!(manager.open());

        let reply = manager.read().unwrap();
        assert_eq!(reply.bytes(), Some(&b"PONG"[..]));

        manager.write_text("PING");
        assert_eq!(manager.write_stats().failures, 0);
        assert!(manager.read().unwrap().is_end_of_stream());

        manager.close();
        assert!(!manager.is_open());
        assert_eq!(std::fs::read(node.path()).unwrap(), b"PONGPING");
    }

    #[test]
    fn test_bind_error_kinds() {
        assert_eq!(
            bind_error(io::ErrorKind::PermissionDenied.into()),
            AdkError::PermissionDenied
        );
        assert_eq!(bind_error(io::ErrorKind::NotFound.into()), AdkError::NoAccessory);
        assert_eq!(
            bind_error(io::ErrorKind::ConnectionReset.into()),
            AdkError::Io(embedded_io::ErrorKind::ConnectionReset)
        );
    }

    #[test]
    fn test_detach_by_node_path() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let manager = AdkManager::new(DevNodeHost::new(node.path()));
        assert!(manager.open());

        let other = DevNodeAccessory {
            path: PathBuf::from("/dev/other"),
        };
        assert!(!manager.notify_detached(Some(&other)));

        let bound = DevNodeAccessory {
            path: node.path().to_path_buf(),
        };
        assert!(manager.notify_detached(Some(&bound)));
        assert!(!manager.is_open());
    }
}
