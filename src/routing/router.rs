//! Routing objects and per-generation lookup.
//!
//! # Responsibilities
//! - Pair a path prefix with the origin pool serving it
//! - Look up the routing object for a request path
//! - Address routing objects by application id
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest matching prefix wins, independent of document order
//! - Explicit `None` on miss rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use crate::pool::OriginPool;
use crate::routing::matcher::PathPrefixMatcher;

/// The compiled form of one application.
#[derive(Debug)]
pub struct RoutingObject {
    id: String,
    matcher: PathPrefixMatcher,
    pool: OriginPool,
}

impl RoutingObject {
    pub fn new(id: impl Into<String>, path_prefix: impl Into<String>, pool: OriginPool) -> Self {
        Self {
            id: id.into(),
            matcher: PathPrefixMatcher::new(path_prefix),
            pool,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path_prefix(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn pool(&self) -> &OriginPool {
        &self.pool
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }
}

/// All routing objects of one generation.
#[derive(Debug, Default)]
pub struct RoutingTable {
    /// Ordered by descending prefix length.
    objects: Vec<Arc<RoutingObject>>,
    by_id: HashMap<String, usize>,
}

impl RoutingTable {
    pub fn new(objects: Vec<RoutingObject>) -> Self {
        let mut objects: Vec<Arc<RoutingObject>> = objects.into_iter().map(Arc::new).collect();
        // Stable sort keeps document order among equal lengths.
        objects.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));

        let by_id = objects
            .iter()
            .enumerate()
            .map(|(i, object)| (object.id.clone(), i))
            .collect();

        Self { objects, by_id }
    }

    /// Find the routing object serving `path`.
    pub fn resolve(&self, path: &str) -> Option<&Arc<RoutingObject>> {
        self.objects.iter().find(|object| object.matches(path))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RoutingObject>> {
        self.by_id.get(id).map(|&i| &self.objects[i])
    }

    /// Routing objects, most specific prefix first.
    pub fn objects(&self) -> &[Arc<RoutingObject>] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
