//! Detachment notifications.
//!
//! The host delivers "accessory detached" notifications on its own
//! dispatcher thread. The manager hands out a [`DetachFilter`] and a
//! [`DetachListener`]; the caller registers them with the host and the
//! listener closes the manager when the bound accessory goes away.

use std::sync::Weak;

use log::debug;

use crate::manager::Shared;
use crate::traits::AccessoryHost;

/// The host notification action a listener is interested in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachFilter {
    action: String,
}

impl DetachFilter {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn matches(&self, action: &str) -> bool {
        self.action == action
    }
}

/// Closes the manager when its bound accessory is detached
///
/// Holds only a weak reference, so a registered listener does not keep a
/// dropped manager alive.
pub struct DetachListener<H: AccessoryHost> {
    shared: Weak<Shared<H>>,
    filter: DetachFilter,
}

impl<H: AccessoryHost> Clone for DetachListener<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            filter: self.filter.clone(),
        }
    }
}

impl<H: AccessoryHost> DetachListener<H> {
    pub(crate) fn new(shared: Weak<Shared<H>>, filter: DetachFilter) -> Self {
        Self { shared, filter }
    }

    pub fn filter(&self) -> &DetachFilter {
        &self.filter
    }

    /// Handle one host notification
    ///
    /// Returns `true` if the notification closed the connection.
    pub fn on_receive(&self, action: &str, accessory: Option<&H::Accessory>) -> bool {
        if !self.filter.matches(action) {
            debug!("Ignoring host notification {}", action);
            return false;
        }
        match self.shared.upgrade() {
            Some(shared) => shared.notify_detached(accessory),
            None => false,
        }
    }
}
