//! Round-robin origin rotation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::pool::endpoint::OriginEndpoint;

/// Round-robin selector.
/// Stores an internal counter to rotate through origins.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, origins: &[Arc<OriginEndpoint>]) -> Option<Arc<OriginEndpoint>> {
        if origins.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % origins.len();
        Some(origins[index].clone())
    }
}
