//! Reconfiguration coordinator.
//!
//! One cycle is validate → build → publish. Cycles never overlap, and a
//! failure at any stage leaves the registry as it was.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::observability::metrics;
use crate::registry::{Candidate, GenerationId, PublishError, Registry};
use crate::reload::watcher::DocumentReceiver;
use crate::routing::{build, BuildContext, BuildError};
use crate::topology::{parse, DefinitionDocument, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReloadState {
    Idle,
    Validating,
    Building,
    Publishing,
}

/// Running account of reconfiguration cycles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadReport {
    pub state: ReloadState,
    /// Cycles finished, whatever their outcome.
    pub cycles: u64,
    pub published: u64,
    pub rejected: u64,
    pub last_generation: GenerationId,
    pub last_error: Option<String>,
}

impl Default for ReloadReport {
    fn default() -> Self {
        Self {
            state: ReloadState::Idle,
            cycles: 0,
            published: 0,
            rejected: 0,
            last_generation: GenerationId::INITIAL,
            last_error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to build routing objects: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl ReloadError {
    /// Outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ReloadError::Validation(_) => "invalid",
            ReloadError::Build(_) => "build_failed",
            ReloadError::Publish(_) => "stale",
        }
    }
}

enum Outcome {
    Published,
    Unchanged,
    Rejected(String),
}

/// Drives documents through parse, build and publish.
pub struct Coordinator {
    registry: Arc<Registry>,
    context: BuildContext,
    cycle: Mutex<()>,
    report: watch::Sender<ReloadReport>,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>, context: BuildContext) -> Self {
        let (report, _) = watch::channel(ReloadReport::default());
        Self {
            registry,
            context,
            cycle: Mutex::new(()),
            report,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Receiver updated on every state change and at the end of each cycle.
    pub fn reports(&self) -> watch::Receiver<ReloadReport> {
        self.report.subscribe()
    }

    pub fn report(&self) -> ReloadReport {
        self.report.borrow().clone()
    }

    /// Run one full cycle for `document`.
    ///
    /// A document identical to the live one is accepted without publishing
    /// a new generation.
    pub fn reconfigure(&self, document: &DefinitionDocument) -> Result<GenerationId, ReloadError> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);

        let fingerprint = document.fingerprint();
        let (parent, unchanged) = {
            let live = self.registry.current();
            (live.id(), live.fingerprint() == Some(fingerprint))
        };
        if unchanged {
            tracing::debug!(fingerprint = %fingerprint, "Definition unchanged, nothing to publish");
            self.finish(Outcome::Unchanged);
            return Ok(parent);
        }

        let result = self.run_cycle(parent, document);
        match &result {
            Ok(generation) => {
                tracing::info!(
                    generation = %generation,
                    fingerprint = %fingerprint,
                    "Topology reconfigured"
                );
                self.finish(Outcome::Published);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fingerprint = %fingerprint,
                    live = %self.registry.current().id(),
                    "Topology rejected, keeping live generation"
                );
                metrics::record_reload(e.outcome());
                self.finish(Outcome::Rejected(e.to_string()));
            }
        }
        result
    }

    fn run_cycle(
        &self,
        parent: GenerationId,
        document: &DefinitionDocument,
    ) -> Result<GenerationId, ReloadError> {
        self.set_state(ReloadState::Validating);
        let topology = parse(document)?;

        self.set_state(ReloadState::Building);
        let objects = build(&topology, &self.context)?;

        self.set_state(ReloadState::Publishing);
        let candidate = Candidate::new(parent, topology, objects).with_fingerprint(document.fingerprint());
        let generation = self.registry.publish(candidate)?;

        metrics::record_reload("published");
        metrics::set_generation(generation.get());
        Ok(generation)
    }

    fn set_state(&self, state: ReloadState) {
        self.report.send_modify(|report| report.state = state);
    }

    fn finish(&self, outcome: Outcome) {
        let live = self.registry.current().id();
        self.report.send_modify(|report| {
            report.state = ReloadState::Idle;
            report.cycles += 1;
            report.last_generation = live;
            match outcome {
                Outcome::Published => {
                    report.published += 1;
                    report.last_error = None;
                }
                Outcome::Unchanged => report.last_error = None,
                Outcome::Rejected(e) => {
                    report.rejected += 1;
                    report.last_error = Some(e);
                }
            }
        });
    }

    /// Consume documents until shutdown. Documents that arrive during a
    /// cycle replace each other; only the latest is processed next.
    pub async fn run(self: Arc<Self>, mut documents: DocumentReceiver, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Reconfiguration coordinator started");

        loop {
            tokio::select! {
                changed = documents.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let document = documents.borrow_and_update().clone();
                    if let Some(document) = document {
                        match self.reconfigure(&document) {
                            Ok(generation) => tracing::debug!(generation = %generation, "Reload cycle finished"),
                            Err(e) => tracing::debug!(outcome = e.outcome(), "Reload cycle rejected"),
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Reconfiguration coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::watcher::document_channel;
    use std::time::{Duration, SystemTime};

    const TWO_APPS: &str = r#"
- { id: appA, path: "/a", origins: [{ id: a1, host: "localhost:9001" }] }
- { id: appB, path: "/b", origins: [{ id: b1, host: "localhost:9002" }] }
"#;

    fn document(text: &str) -> DefinitionDocument {
        DefinitionDocument::new(text.to_string(), SystemTime::now())
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(Registry::new()), BuildContext::default())
    }

    #[test]
    fn valid_document_publishes_next_generation() {
        let coordinator = coordinator();
        let generation = coordinator.reconfigure(&document(TWO_APPS)).unwrap();
        assert_eq!(generation, GenerationId::new(1));

        let report = coordinator.report();
        assert_eq!(report.state, ReloadState::Idle);
        assert_eq!((report.cycles, report.published, report.rejected), (1, 1, 0));
        assert_eq!(report.last_generation, generation);
        assert!(coordinator.registry().current().resolve("/b/x").is_some());
    }

    #[test]
    fn invalid_document_leaves_registry_untouched() {
        let coordinator = coordinator();
        coordinator.reconfigure(&document(TWO_APPS)).unwrap();
        let before = coordinator.registry().current();

        let err = coordinator
            .reconfigure(&document(r#"
- { id: appA, path: "/a", origins: [{ id: a1, host: "localhost:9001" }] }
- { id: appA, path: "/c", origins: [{ id: a1, host: "localhost:9003" }] }
"#))
            .unwrap_err();
        assert_eq!(err.outcome(), "invalid");

        let after = coordinator.registry().current();
        assert!(Arc::ptr_eq(&before, &after));

        let report = coordinator.report();
        assert_eq!(report.rejected, 1);
        assert!(report.last_error.unwrap().contains("appA"));
    }

    #[test]
    fn build_failure_is_a_rejection() {
        let coordinator = coordinator();
        let err = coordinator
            .reconfigure(&document(r#"
- id: appTls
  path: "/"
  tlsSettings: { sslProvider: OPENSSL }
  origins: [{ id: t1, host: "localhost:8443" }]
"#))
            .unwrap_err();
        assert_eq!(err.outcome(), "build_failed");
        assert_eq!(coordinator.registry().current().id(), GenerationId::INITIAL);
    }

    #[test]
    fn identical_document_is_not_republished() {
        let coordinator = coordinator();
        coordinator.reconfigure(&document(TWO_APPS)).unwrap();
        let again = coordinator.reconfigure(&document(TWO_APPS)).unwrap();

        assert_eq!(again, GenerationId::new(1));
        let report = coordinator.report();
        assert_eq!((report.cycles, report.published), (2, 1));
    }

    #[tokio::test]
    async fn pending_documents_coalesce_to_latest() {
        let coordinator = Arc::new(coordinator());
        let (tx, rx) = document_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // Three documents land before the coordinator looks at the slot.
        tx.send_replace(Some(Arc::new(document("[]"))));
        tx.send_replace(Some(Arc::new(document(TWO_APPS))));
        let last = r#"- { id: appC, path: "/c", origins: [{ id: c1, host: "localhost:9003" }] }"#;
        tx.send_replace(Some(Arc::new(document(last))));

        let mut reports = coordinator.reports();
        let task = tokio::spawn(coordinator.clone().run(rx, shutdown_rx));

        let report = tokio::time::timeout(Duration::from_secs(2), reports.wait_for(|r| r.cycles >= 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(report.cycles, 1);
        assert_eq!(report.last_generation, GenerationId::new(1));

        let live = coordinator.registry().current();
        assert_eq!(live.routing_table().len(), 1);
        assert!(live.object("appC").is_some());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
