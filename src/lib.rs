//! Forward HTTP proxy library.
//!
//! Accepts client connections, reads one request header, then either opens
//! a raw `CONNECT` tunnel or forwards the request with its header rewritten
//! to `HTTP/1.0` / `Connection: close` and relays the response back.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod session;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use lifecycle::Shutdown;
pub use server::ProxyServer;
