//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Validated Topology
//!     → builder.rs (one RoutingObject + OriginPool per application)
//!     → router.rs RoutingTable (sorted by prefix specificity)
//!     → published inside a registry Generation
//!
//! Incoming request path
//!     → RoutingTable::resolve
//!     → matcher.rs (prefix test)
//!     → RoutingObject or miss
//! ```
//!
//! # Design Decisions
//! - Routes compiled per generation, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always resolves to the same object

pub mod builder;
pub mod matcher;
pub mod router;

pub use builder::{build, BuildContext, BuildError};
pub use router::{RoutingObject, RoutingTable};
