//! Topology reload subsystem.
//!
//! # Data Flow
//! ```text
//! DefinitionSource (file, memory)
//!     → SourceWatcher::poll (fingerprint change detection)
//!     → watch slot (latest pending document only)
//!     → Coordinator::reconfigure (parse → build → publish)
//!     → Registry
//! ```
//!
//! # Design Decisions
//! - Watcher and coordinator are separate tasks joined by a `watch` channel,
//!   so a slow cycle coalesces intermediate edits instead of queueing them
//! - Rejections are logged and counted; nothing here is fatal

pub mod coordinator;
pub mod source;
pub mod watcher;

pub use coordinator::{Coordinator, ReloadError, ReloadReport, ReloadState};
pub use source::{DefinitionSource, FileSource, MemorySource, SourceError, SourcePayload};
pub use watcher::{document_channel, DocumentReceiver, DocumentSender, SourceWatcher};
