//! HTTP serving path.
//!
//! # Data Flow
//! ```text
//! Client connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → Registry::current → longest-prefix routing object
//!     → request.rs (origin-form URI, hop-by-hop removal)
//!     → pool connect + send
//!     → response.rs (hop-by-hop removal, generation lease on the body)
//!     → Client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
