//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Registry → Coordinator → first read of the origins source
//!     → watcher + coordinator tasks → proxy and admin listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → listeners drain, background tasks stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when the first topology is tried)
//! - A bad origins file at startup is not fatal; the proxy serves 502s
//!   until a valid definition arrives

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, start_with_source, ProxyHandle, StartupError};
