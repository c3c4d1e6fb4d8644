//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → request.rs (target URL, header whitelist, origin request)
//!     → cookies.rs (Cookie encoding / Set-Cookie filtering)
//!     → origin fetch (reqwest, redirects never followed)
//!     → [transform subsystem picks and runs the transform path]
//!     → response.rs (assemble response, uniform 502 on failure)
//!     → Send to client
//! ```

pub mod cookies;
pub mod request;
pub mod response;
pub mod server;

pub use cookies::CookiePolicy;
pub use request::{OriginRequestBuilder, OutboundRequest, RequestContext};
pub use response::{bad_gateway, UpstreamResponse, BAD_GATEWAY_HTML};
pub use server::{AppState, HttpServer};
