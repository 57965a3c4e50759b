//! Reverse proxy with a live-reloaded origins topology.
//!
//! # Architecture Overview
//!
//! ```text
//!   origins.yml ──▶ reload::SourceWatcher ──▶ reload::Coordinator
//!                                                 │ topology::parse
//!                                                 │ routing::build
//!                                                 ▼
//!                                        registry::Registry (ArcSwap)
//!                                           │               │
//!   Client ──▶ http::server ──resolve───────┘               └──▶ admin API
//!                   │
//!                   ▼
//!              pool::OriginPool ──▶ net::connector (TCP / rustls) ──▶ Origin
//! ```

// Topology model and reload pipeline
pub mod registry;
pub mod reload;
pub mod routing;
pub mod topology;

// Serving path
pub mod http;
pub mod net;
pub mod pool;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{ProxyHandle, Shutdown};
pub use registry::Registry;
