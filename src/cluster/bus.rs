//! In-process topic bus.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::services::ClusterEventListener;

/// A message published on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMessage {
    pub topic: String,
    pub origin: String,
    pub payload: String,
}

/// Topic → listeners.
#[derive(Default)]
pub struct ClusterBus {
    listeners: DashMap<String, Vec<Arc<dyn ClusterEventListener>>>,
}

impl ClusterBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, topic: &str, listener: Arc<dyn ClusterEventListener>) {
        self.listeners
            .entry(topic.to_string())
            .or_default()
            .push(listener);
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners.get(topic).map_or(0, |entry| entry.len())
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Hand `message` to every listener of its topic. Returns how many.
    pub fn deliver(&self, message: &ClusterMessage) -> usize {
        // Clone out of the map so listeners may register further listeners.
        let listeners = match self.listeners.get(&message.topic) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };
        for listener in &listeners {
            listener.on_cluster_event(&message.payload);
        }
        trace!(topic = %message.topic, origin = %message.origin, delivered = listeners.len(), "Cluster message delivered");
        listeners.len()
    }
}

impl std::fmt::Debug for ClusterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterBus")
            .field("topics", &self.topics())
            .finish()
    }
}
