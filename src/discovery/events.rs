//! Discovery Event Reporter
//!
//! Forwards discovery events to the cluster, once per
//! `reason:type:disk` key for the lifetime of the process.

use crate::domain::ports::{DiskEvent, EventSink};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Deduplicating event reporter.
///
/// The seen-set is never evicted. Keys are bounded by the event reasons
/// times the devices on one node, which stays small for a node agent.
pub struct EventReporter {
    sink: Arc<dyn EventSink>,
    node_name: Option<String>,
    reported: Mutex<HashSet<String>>,
}

impl EventReporter {
    pub fn new(sink: Arc<dyn EventSink>, node_name: Option<String>) -> Self {
        Self {
            sink,
            node_name: node_name.filter(|n| !n.is_empty()),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Publish an event unless its key was reported before. Returns whether
    /// the event was forwarded.
    pub async fn report(&self, event: DiskEvent) -> bool {
        let key = event.dedup_key();
        if !self.reported.lock().insert(key.clone()) {
            debug!("dropping repeated event {}", key);
            return false;
        }

        let mut event = event;
        if let Some(node) = &self.node_name {
            event.message = format!("{} - {}", node, event.message);
        }

        if let Err(e) = self.sink.publish(&event).await {
            warn!("failed to publish event {}: {}", key, e);
        }
        true
    }

    /// Number of distinct keys reported so far
    pub fn reported_count(&self) -> usize {
        self.reported.lock().len()
    }
}
