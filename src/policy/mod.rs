//! Host policy subsystem.
//!
//! # Data Flow
//! ```text
//! Requesting hostname
//!     → trust.rs (allow-list suffix match → Friendly | Hostile)
//!     → host_policy.rs (forceSecure lookup → upgrade origin URL)
//!
//! Redirect responses:
//!     → transform::redirect (may record a forceSecure host)
//!     → host_policy.rs (append-only insert)
//! ```
//!
//! # Design Decisions
//! - The allow-list is immutable after startup
//! - The host policy store only grows; entries are never removed or downgraded
//! - Both lookups use plain suffix matching on the lowercased hostname

pub mod host_policy;
pub mod trust;

pub use host_policy::{downgrade_location, upgrade_scheme, HostPolicyStore};
pub use trust::{AllowList, Trust};
