//! Origin-side networking.
//!
//! # Data Flow
//! ```text
//! TlsPolicy → tls.rs (rustls ClientConfig or "unnegotiable")
//!     → connector.rs (TCP → optional TLS → HTTP/1.1 handshake)
//!     → Connection handed to the serving path
//! ```

pub mod connector;
pub mod tls;

pub use connector::{ConnectError, Connection, OriginConnector};
