//! Transforming HTTP proxy for legacy clients.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    LEGACY PROXY                      │
//!                    │                                                      │
//!   Legacy client    │  ┌─────────┐    ┌──────────┐    ┌────────────────┐   │
//!   ─────────────────┼─▶│  http   │───▶│  policy  │───▶│  origin fetch  │───┼──▶ Origin
//!   (plain HTTP)     │  │ server  │    │ trust +  │    │ (scheme upgrade│   │   (HTTP/HTTPS)
//!                    │  └─────────┘    │ force-   │    │  referer fix)  │   │
//!                    │                 │ secure   │    └───────┬────────┘   │
//!                    │                 └──────────┘            │            │
//!                    │                                         ▼            │
//!   Client response  │  ┌─────────┐    ┌─────────────────────────────────┐  │
//!   ◀────────────────┼──│response │◀───│           transform             │  │
//!                    │  └─────────┘    │ redirect │ html │ css │ image    │  │
//!                    │                 └─────────────────────────────────┘  │
//!                    │                                                      │
//!                    │  Cross-cutting: config · observability · lifecycle   │
//!                    └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod transform;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
