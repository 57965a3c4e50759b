//! Published generations and publish candidates.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::routing::{RoutingObject, RoutingTable};
use crate::topology::{Fingerprint, Topology};

/// Monotonically increasing generation number. `0` is the empty generation
/// the registry starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(u64);

impl GenerationId {
    pub const INITIAL: GenerationId = GenerationId(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One published, immutable routing graph.
///
/// Readers hold an `Arc<Generation>` for the duration of a request; the
/// generation is dropped once the registry has moved on and the last such
/// reader is done.
#[derive(Debug)]
pub struct Generation {
    id: GenerationId,
    topology: Arc<Topology>,
    table: RoutingTable,
    fingerprint: Option<Fingerprint>,
    published_at: SystemTime,
}

impl Generation {
    pub(crate) fn empty() -> Self {
        Self {
            id: GenerationId::INITIAL,
            topology: Arc::new(Topology::default()),
            table: RoutingTable::default(),
            fingerprint: None,
            published_at: SystemTime::now(),
        }
    }

    pub(crate) fn from_candidate(id: GenerationId, candidate: Candidate) -> Self {
        Self {
            id,
            topology: Arc::new(candidate.topology),
            table: RoutingTable::new(candidate.objects),
            fingerprint: candidate.fingerprint,
            published_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    /// Routing object serving `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&Arc<RoutingObject>> {
        self.table.resolve(path)
    }

    pub fn object(&self, id: &str) -> Option<&Arc<RoutingObject>> {
        self.table.get(id)
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn published_at(&self) -> SystemTime {
        self.published_at
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        tracing::debug!(generation = %self.id, "Generation released");
    }
}

/// A fully built generation waiting to be published.
#[derive(Debug)]
pub struct Candidate {
    parent: GenerationId,
    topology: Topology,
    objects: Vec<RoutingObject>,
    fingerprint: Option<Fingerprint>,
}

impl Candidate {
    /// `parent` is the generation that was live when the build started.
    pub fn new(parent: GenerationId, topology: Topology, objects: Vec<RoutingObject>) -> Self {
        Self {
            parent,
            topology,
            objects,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn parent(&self) -> GenerationId {
        self.parent
    }
}
