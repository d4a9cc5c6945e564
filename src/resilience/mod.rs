//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connect to target:
//!     → timeouts.rs (optional connect deadline)
//!     → On failure: session reports UpstreamConnect / ConnectTimeout
//!
//! Accept fails (e.g. EMFILE):
//!     → backoff.rs (growing pause before the next accept)
//! ```
//!
//! # Design Decisions
//! - No upstream retries: a failed connect ends the session
//! - Deadlines are opt-in; the default matches an unbounded connect

pub mod backoff;
pub mod timeouts;
