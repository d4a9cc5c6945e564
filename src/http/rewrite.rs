//! Header rewriting applied to forwarded requests and responses.
//!
//! Every relayed message is made single-use: the start line is downgraded to
//! `HTTP/1.0` and keep-alive directives become `close`, so neither peer
//! expects the connection to carry a second message.
//!
//! Rewriting works on raw bytes. Field values may carry obs-text, which is
//! not UTF-8 and must reach the peer unchanged.

use bytes::BytesMut;

const DOWNGRADED_VERSION: &[u8; 8] = b"HTTP/1.0";
const CRLF: &[u8] = b"\r\n";

/// Rewrite a header block (terminator excluded).
///
/// The first `HTTP/<digit>.<digit>` on the start line becomes `HTTP/1.0`.
/// Field lines exactly equal to `Connection: keep-alive` or
/// `Proxy-Connection: keep-alive` get the value `close`. Everything else is
/// passed through byte for byte, in order.
pub fn rewrite(header: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(header.len());
    for (i, line) in crlf_lines(header).enumerate() {
        if i == 0 {
            downgrade_version(line, &mut out);
            continue;
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(match line {
            b"Connection: keep-alive" => &b"Connection: close"[..],
            b"Proxy-Connection: keep-alive" => &b"Proxy-Connection: close"[..],
            other => other,
        });
    }
    out
}

/// Split `header` on CRLF. Like `str::split`, a trailing CRLF yields a final
/// empty line.
pub(crate) fn crlf_lines(header: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(header);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(CRLF.len()).position(|w| w == CRLF) {
            Some(at) => {
                rest = Some(&current[at + CRLF.len()..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// Append `line` to `out` with its first `HTTP/d.d` replaced by `HTTP/1.0`.
fn downgrade_version(line: &[u8], out: &mut BytesMut) {
    let found = line.windows(DOWNGRADED_VERSION.len()).position(|w| {
        w.starts_with(b"HTTP/") && w[5].is_ascii_digit() && w[6] == b'.' && w[7].is_ascii_digit()
    });
    match found {
        Some(at) => {
            out.extend_from_slice(&line[..at]);
            out.extend_from_slice(DOWNGRADED_VERSION);
            out.extend_from_slice(&line[at + DOWNGRADED_VERSION.len()..]);
        }
        None => out.extend_from_slice(line),
    }
}
