//! Topology definition subsystem.
//!
//! # Data Flow
//! ```text
//! definition source bytes
//!     → document.rs (fingerprint + timestamp)
//!     → parser.rs (YAML structure, then semantic checks)
//!     → model.rs Topology (validated, immutable)
//!     → handed to the routing builder
//! ```
//!
//! # Design Decisions
//! - A document is accepted or rejected as a whole; no partial application
//! - Parsing is a pure function of the document bytes
//! - Every violation is reported, not just the first

pub mod document;
pub mod model;
pub mod parser;

pub use document::{DefinitionDocument, Fingerprint};
pub use model::{ApplicationSpec, OriginSpec, TlsPolicy, TlsProtocol, TlsProvider, Topology};
pub use parser::{parse, ValidationError, Violation};
