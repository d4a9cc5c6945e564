//! HTTP/1.x header handling.
//!
//! # Data Flow
//! ```text
//! client bytes
//!     → assembler.rs (buffer chunks until CRLF CRLF)
//!     → request.rs (method, request target, Host line → Target)
//!     → rewrite.rs (HTTP/1.0, Connection: close)
//!     → upstream
//!
//! upstream bytes (forward branch only)
//!     → assembler.rs → rewrite.rs → client
//! ```
//!
//! Bodies are never parsed; everything after the first header block in a
//! direction is relayed verbatim.

pub mod assembler;
pub mod request;
pub mod rewrite;

pub use assembler::{Assembled, HeaderAssembler, HeaderBlock, HEADER_TERMINATOR};
pub use request::ParsedHeader;
pub use rewrite::rewrite;

/// Host and port a session connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` suitable for `TcpStream::connect`, bracketing IPv6 literals.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.socket_addr())
    }
}

/// Fixed replies written by the proxy itself.
pub mod replies {
    pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";
    pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";
    pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
    pub const HEADER_TOO_LARGE: &[u8] = b"HTTP/1.1 431 Request Header Fields Too Large\r\n\r\n";
}
