//! Notebook change notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::services::notebook::ParagraphStatus;
use crate::services::ClusterEventListener;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotebookEvent {
    NoteLoaded { note_id: String },
    NoteRemoved { note_id: String },
    ParagraphStatus {
        note_id: String,
        paragraph_id: String,
        status: ParagraphStatus,
    },
}

/// Fan-out of notebook events to local subscribers.
///
/// Events received from peers over the cluster bus are re-published here.
#[derive(Debug)]
pub struct NotebookEventHub {
    tx: broadcast::Sender<NotebookEvent>,
}

impl NotebookEventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotebookEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: NotebookEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for NotebookEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterEventListener for NotebookEventHub {
    fn on_cluster_event(&self, message: &str) {
        match serde_json::from_str::<NotebookEvent>(message) {
            Ok(event) => {
                self.publish(event);
            }
            Err(e) => warn!(error = %e, "Ignoring malformed notebook event"),
        }
    }
}
