//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection id, live-session tracking)
//!     → Hand off to a session task
//!
//! Session needs a target
//!     → upstream.rs (Connector: TCP connect with optional deadline)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Sessions depend on the `Connector` trait, never on sockets directly

pub mod connection;
pub mod listener;
pub mod upstream;

pub use listener::Listener;
pub use upstream::{Connector, ProxyStream, TcpConnector};
