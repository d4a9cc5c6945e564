//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream connects with an optional deadline
//! - Keep timeout errors distinct from I/O errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - No deadline configured means wait indefinitely

use std::future::Future;
use std::time::Duration;

/// The deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {:?} elapsed", self.0)
    }
}

impl std::error::Error for Elapsed {}

/// Run `fut`, bounded by `limit` when one is set.
pub async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Elapsed(limit)),
        None => Ok(fut.await),
    }
}
