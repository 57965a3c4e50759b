//! Live object registry.
//!
//! # Data Flow
//! ```text
//! Coordinator (single writer)
//!     → Candidate (built against the live generation)
//!     → publish: check parent, swap snapshot, retire previous
//!
//! Serving path / admin API (many readers)
//!     → current(): Arc<Generation>, lock-free
//!     → hold it until the request is finished (drain)
//! ```
//!
//! # Design Decisions
//! - Swap of an immutable snapshot, never in-place mutation
//! - Readers never take the writer lock
//! - Retired generations are tracked weakly; they are freed by their last reader
//! - Every publish bumps a watch channel so callers can await a generation

pub mod generation;
pub mod snapshot;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::watch;

pub use generation::{Candidate, Generation, GenerationId};
pub use snapshot::{OriginView, RegistrySnapshot, RoutingObjectView, TlsView};

/// Refusal to publish a candidate.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("candidate was built against generation {expected}, but generation {actual} is live")]
    Stale {
        expected: GenerationId,
        actual: GenerationId,
    },
}

/// Versioned slot holding the live generation.
pub struct Registry {
    live: ArcSwap<Generation>,
    writer: Mutex<()>,
    retired: Mutex<Vec<(GenerationId, Weak<Generation>)>>,
    published: watch::Sender<GenerationId>,
}

impl Registry {
    /// A registry serving the empty generation `0`.
    pub fn new() -> Self {
        let (published, _) = watch::channel(GenerationId::INITIAL);
        Self {
            live: ArcSwap::from_pointee(Generation::empty()),
            writer: Mutex::new(()),
            retired: Mutex::new(Vec::new()),
            published,
        }
    }

    /// The latest published generation. Never blocks.
    pub fn current(&self) -> Arc<Generation> {
        self.live.load_full()
    }

    /// Make `candidate` the live generation.
    ///
    /// Fails if another generation was published after the candidate's
    /// parent; the caller should rebuild from the newer state.
    pub fn publish(&self, candidate: Candidate) -> Result<GenerationId, PublishError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let live = self.live.load();
        if live.id() != candidate.parent() {
            return Err(PublishError::Stale {
                expected: candidate.parent(),
                actual: live.id(),
            });
        }

        let next = Arc::new(Generation::from_candidate(live.id().next(), candidate));
        let id = next.id();
        drop(live);

        let previous = self.live.swap(next);
        self.retire(previous);
        self.published.send_replace(id);

        tracing::info!(generation = %id, "Generation published");
        Ok(id)
    }

    fn retire(&self, previous: Arc<Generation>) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.push((previous.id(), Arc::downgrade(&previous)));
        // Our own reference goes now; in-flight readers keep it alive.
        drop(previous);
        prune(&mut retired);
    }

    /// Superseded generations still referenced by in-flight requests.
    pub fn draining(&self) -> Vec<GenerationId> {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut retired);
        retired.iter().map(|(id, _)| *id).collect()
    }

    /// Serializable view of the live generation.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let draining = self.draining();
        RegistrySnapshot::capture(&self.current(), draining)
    }

    /// Receiver that observes every published generation id.
    pub fn subscribe(&self) -> watch::Receiver<GenerationId> {
        self.published.subscribe()
    }

    /// Wait until generation `target` (or a later one) is live.
    pub async fn wait_for_generation(&self, target: GenerationId) -> GenerationId {
        let mut published = self.subscribe();
        let reached = published.wait_for(|id| *id >= target).await.map(|id| *id);
        reached.unwrap_or_else(|_| self.current().id())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.live.load().id())
            .finish_non_exhaustive()
    }
}

fn prune(retired: &mut Vec<(GenerationId, Weak<Generation>)>) {
    retired.retain(|(id, generation)| {
        let alive = generation.strong_count() > 0;
        if !alive {
            tracing::info!(generation = %id, "Generation drained");
        }
        alive
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{build, BuildContext};
    use crate::topology::{parse, DefinitionDocument};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, SystemTime};

    fn candidate(registry: &Registry, text: &str) -> Candidate {
        let document = DefinitionDocument::new(text.to_string(), SystemTime::now());
        let topology = parse(&document).unwrap();
        let objects = build(&topology, &BuildContext::default()).unwrap();
        Candidate::new(registry.current().id(), topology, objects).with_fingerprint(document.fingerprint())
    }

    const GREEN: &str = r#"
- { id: green-a, path: "/a", origins: [{ id: o1, host: "localhost:9001" }] }
- { id: green-b, path: "/b", origins: [{ id: o1, host: "localhost:9002" }] }
"#;

    const BLUE: &str = r#"
- { id: blue-a, path: "/a", origins: [{ id: o1, host: "localhost:9101" }] }
- { id: blue-b, path: "/b", origins: [{ id: o1, host: "localhost:9102" }] }
- { id: blue-c, path: "/c", origins: [{ id: o1, host: "localhost:9103" }] }
"#;

    #[test]
    fn starts_empty() {
        let registry = Registry::new();
        let live = registry.current();
        assert_eq!(live.id(), GenerationId::INITIAL);
        assert!(live.routing_table().is_empty());
        assert!(live.resolve("/").is_none());
    }

    #[test]
    fn publish_replaces_whole_generation() {
        let registry = Registry::new();
        let first = registry.publish(candidate(&registry, GREEN)).unwrap();
        assert_eq!(first, GenerationId::new(1));

        let second = registry.publish(candidate(&registry, BLUE)).unwrap();
        assert_eq!(second, GenerationId::new(2));

        let live = registry.current();
        assert_eq!(live.resolve("/a/x").unwrap().id(), "blue-a");
        assert!(live.object("green-b").is_none());
        assert_eq!(live.routing_table().len(), 3);
    }

    #[test]
    fn stale_candidate_refused() {
        let registry = Registry::new();
        let stale = candidate(&registry, GREEN);
        registry.publish(candidate(&registry, BLUE)).unwrap();

        let err = registry.publish(stale).unwrap_err();
        assert!(matches!(err, PublishError::Stale { expected, actual }
            if expected == GenerationId::INITIAL && actual == GenerationId::new(1)));
        assert_eq!(registry.current().object("blue-c").unwrap().id(), "blue-c");
    }

    #[test]
    fn held_generation_drains_after_release() {
        let registry = Registry::new();
        registry.publish(candidate(&registry, GREEN)).unwrap();

        let in_flight = registry.current();
        registry.publish(candidate(&registry, BLUE)).unwrap();

        // The old reader still routes with the old objects.
        assert_eq!(in_flight.resolve("/a").unwrap().id(), "green-a");
        assert_eq!(registry.draining(), vec![GenerationId::new(1)]);

        drop(in_flight);
        assert!(registry.draining().is_empty());
    }

    #[test]
    fn readers_never_see_mixed_generations() {
        let registry = Arc::new(Registry::new());
        registry.publish(candidate(&registry, GREEN)).unwrap();

        let green: HashSet<&str> = ["green-a", "green-b"].into();
        let blue: HashSet<&str> = ["blue-a", "blue-b", "blue-c"].into();
        let green_candidates: Vec<_> = (0..50).map(|_| GREEN).collect();
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let stop = stop.clone();
                let (green, blue) = (green.clone(), blue.clone());
                std::thread::spawn(move || {
                    let mut observed = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        let live = registry.current();
                        let ids: HashSet<&str> =
                            live.routing_table().objects().iter().map(|o| o.id()).collect();
                        assert!(ids == green || ids == blue, "mixed generation: {:?}", ids);
                        observed += 1;
                    }
                    observed
                })
            })
            .collect();

        for text in green_candidates {
            registry.publish(candidate(&registry, BLUE)).unwrap();
            registry.publish(candidate(&registry, text)).unwrap();
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(registry.current().id(), GenerationId::new(101));
    }

    #[test]
    fn snapshot_lists_objects_in_definition_order() {
        let registry = Registry::new();
        registry.publish(candidate(&registry, r#"
- { id: root, path: "/", origins: [{ id: r1, host: "localhost:9001" }] }
- id: secure
  path: "/secure"
  tlsSettings: { trustAllCerts: true, protocols: [TLSv1.1] }
  origins: [{ id: s1, host: "localhost:9443" }]
"#)).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.generation, GenerationId::new(1));
        assert_eq!(snapshot.objects[0].id, "root");
        assert_eq!(snapshot.objects[0].origins[0].port, 9001);

        let tls = snapshot.object("secure").unwrap().tls.as_ref().unwrap();
        assert_eq!(tls.protocols, vec!["TLSv1.1"]);
        assert!(!tls.negotiable);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["objects"][1]["pathPrefix"], "/secure");
        assert_eq!(json["objects"][1]["tls"]["trustAllCerts"], true);
    }

    #[tokio::test]
    async fn wait_for_generation_observes_publish() {
        let registry = Arc::new(Registry::new());
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_generation(GenerationId::new(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.publish(candidate(&registry, GREEN)).unwrap();

        let reached = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reached, GenerationId::new(1));
    }
}
