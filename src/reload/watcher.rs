//! Periodic change detection on a definition source.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::reload::source::DefinitionSource;
use crate::topology::{DefinitionDocument, Fingerprint};

/// Latest-wins slot carrying documents from the watcher to the coordinator.
pub type DocumentSender = watch::Sender<Option<Arc<DefinitionDocument>>>;
pub type DocumentReceiver = watch::Receiver<Option<Arc<DefinitionDocument>>>;

/// Create an empty document slot.
pub fn document_channel() -> (DocumentSender, DocumentReceiver) {
    watch::channel(None)
}

/// Polls a [`DefinitionSource`] and reports content changes.
pub struct SourceWatcher {
    source: Arc<dyn DefinitionSource>,
    poll_interval: Duration,
    monitor: bool,
    last: Option<Fingerprint>,
}

impl SourceWatcher {
    pub fn new(source: Arc<dyn DefinitionSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            monitor: true,
            last: None,
        }
    }

    /// With monitoring off `run` never reads the source; the caller's own
    /// `poll` before `run` is the only read.
    pub fn monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn location(&self) -> String {
        self.source.location()
    }

    /// Read the source once. Returns a document only when its content
    /// differs from the last one returned.
    pub async fn poll(&mut self) -> Option<DefinitionDocument> {
        let payload = match self.source.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Definition source unavailable, keeping current topology");
                return None;
            }
        };

        let fingerprint = Fingerprint::of(&payload.content);
        if self.last == Some(fingerprint) {
            return None;
        }
        self.last = Some(fingerprint);

        let observed_at = payload.modified.unwrap_or_else(SystemTime::now);
        tracing::info!(
            source = %self.source.location(),
            fingerprint = %fingerprint,
            bytes = payload.content.len(),
            "Definition change detected"
        );
        Some(DefinitionDocument::new(payload.content, observed_at))
    }

    /// Poll until shutdown, handing each new document to `documents`.
    pub async fn run(mut self, documents: DocumentSender, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            source = %self.source.location(),
            interval_ms = self.poll_interval.as_millis() as u64,
            monitor = self.monitor,
            "Source watcher started"
        );

        if !self.monitor {
            // The coordinator stops as soon as this sender drops.
            let _ = shutdown.recv().await;
            drop(documents);
            tracing::info!("Source watcher stopped");
            return;
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(document) = self.poll().await {
                        // Overwrites any document the coordinator has not picked up yet.
                        documents.send_replace(Some(Arc::new(document)));
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Source watcher stopped");
    }
}
