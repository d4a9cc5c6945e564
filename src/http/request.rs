//! Request header parsing and target resolution.

use crate::error::{ProxyError, Result};
use crate::http::Target;

const HTTP_DEFAULT_PORT: u16 = 80;
const HTTPS_DEFAULT_PORT: u16 = 443;

/// A request header block broken into its lines.
///
/// Only built from a complete header block, so it never holds partial data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// First token of the request line, e.g. `GET` or `CONNECT`.
    pub method: String,
    /// Second token of the request line: an absolute URL, an origin path or
    /// (for CONNECT) an authority.
    pub uri: String,
    /// The full request line.
    pub request_line: String,
    /// Field lines after the request line, in order.
    pub lines: Vec<String>,
}

impl ParsedHeader {
    /// Split a header block into method, request target and field lines.
    #[tracing::instrument(skip(header), level = "trace")]
    pub fn parse(header: &str) -> Result<Self> {
        let mut lines = header.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();

        let mut tokens = request_line.split(' ');
        let method = tokens.next().unwrap_or_default().to_string();
        if method.is_empty() {
            return Err(ProxyError::MalformedRequest("missing method".into()));
        }
        let uri = match tokens.next() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(ProxyError::MalformedRequest(format!(
                    "missing request target in {:?}",
                    request_line
                )))
            }
        };

        Ok(Self {
            method,
            uri,
            request_line,
            lines: lines.map(str::to_string).collect(),
        })
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    /// Value of the first `Host:` field line, leading whitespace trimmed.
    pub fn host_line(&self) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let name = line.get(..5)?;
            name.eq_ignore_ascii_case("host:")
                .then(|| line[5..].trim_start())
        })
    }

    /// Resolve the host and port to connect to.
    ///
    /// The hostname comes from a non-empty `Host:` line when there is one,
    /// otherwise from the request-line authority. A numeric port on the
    /// `Host:` line overrides one ending the request-line target; without
    /// either the port is 443 for `https` targets and 80 otherwise.
    pub fn target(&self) -> Result<Target> {
        let segments: Vec<&str> = self.uri.split(':').collect();
        let uri_port = if segments.len() >= 2 {
            segments.last().and_then(|s| parse_port(s))
        } else {
            None
        };
        let scheme_port = if segments[0] == "https" {
            HTTPS_DEFAULT_PORT
        } else {
            HTTP_DEFAULT_PORT
        };

        let (host, host_port) = match self.host_line().map(str::trim) {
            Some(value) if !value.is_empty() => split_host_port(value),
            _ => split_host_port(authority_of(&self.uri)),
        };
        if host.is_empty() {
            return Err(ProxyError::MalformedRequest(format!(
                "no host in {:?}",
                self.request_line
            )));
        }

        let port = host_port.or(uri_port).unwrap_or(scheme_port);
        Ok(Target::new(host, port))
    }
}

/// Strip an optional `scheme://` prefix and any path from a request target.
fn authority_of(uri: &str) -> &str {
    let rest = match uri.find("://") {
        Some(idx) => &uri[idx + 3..],
        None => uri,
    };
    if rest.starts_with('/') {
        return "";
    }
    rest.split(['/', '?', '#']).next().unwrap_or_default()
}

/// Split `host[:port]`. Bracketed IPv6 literals lose their brackets; for
/// anything else the port only counts when the value has exactly one colon.
fn split_host_port(value: &str) -> (&str, Option<u16>) {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let port = rest[end + 1..].strip_prefix(':').and_then(parse_port);
            return (&rest[..end], port);
        }
    }
    let parts: Vec<&str> = value.split(':').collect();
    let port = if parts.len() == 2 {
        parse_port(parts[1])
    } else {
        None
    };
    (parts[0], port)
}

/// A port is a non-empty run of ASCII digits naming a value in 1..=65535.
fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok().filter(|p| *p != 0)
}
