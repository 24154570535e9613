//! Connectivity monitor.
//!
//! Publishes online/offline over a watch channel. The platform collaborator
//! that actually probes the network drives [`ConnectivityMonitor::set_online`]
//! from its own task; the orchestrator subscribes and observes flips
//! continuously.

use tokio::sync::watch;
use tracing::debug;

pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with an initial reachability state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Current reachability.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a reachability change. No-op values are deduplicated so
    /// subscribers only wake on real flips.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            debug!(online, "connectivity.changed");
            *current = online;
            true
        });
    }

    /// Subscribe to reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
