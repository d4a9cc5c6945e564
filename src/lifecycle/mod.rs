//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse args → Load config → Validate → Init logging/metrics → Bind → Accept
//!
//! Shutdown (shutdown.rs):
//!     Trigger received → Stop accepting → Exit (in-flight sessions are dropped)
//!
//! Signals (signals.rs):
//!     SIGINT / stdin EOF → Trigger shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
