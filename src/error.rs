//! Error types shared by the proxy subsystems.

use thiserror::Error;

use crate::http::Target;

/// Which end of a session an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The connection accepted from the proxy client.
    Client,
    /// The connection opened towards the target host.
    Upstream,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Upstream => write!(f, "upstream"),
        }
    }
}

/// Errors produced while running the proxy.
///
/// Only `Bind` is fatal to the process. Everything else ends a single
/// session and is logged by the session task.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to establish connection to {} on port {}: {source}", .target.host, .target.port)]
    UpstreamConnect {
        target: Target,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {target} timed out after {secs}s")]
    ConnectTimeout { target: Target, secs: u64 },

    #[error("{0} closed the connection")]
    PeerClosed(Side),

    #[error("header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// True for failures to reach the target host.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamConnect { .. } | ProxyError::ConnectTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failure_message_names_target() {
        let err = ProxyError::UpstreamConnect {
            target: Target::new("example.com", 8080),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("unable to establish connection to example.com on port 8080"));
        assert!(err.is_connect_failure());
    }

    #[test]
    fn timeout_counts_as_connect_failure() {
        let err = ProxyError::ConnectTimeout {
            target: Target::new("example.com", 443),
            secs: 3,
        };
        assert!(err.is_connect_failure());
        assert!(!ProxyError::PeerClosed(Side::Client).is_connect_failure());
    }
}
