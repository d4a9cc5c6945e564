//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions and listener produce:
//!     → logging.rs (structured log events, per-session spans)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
