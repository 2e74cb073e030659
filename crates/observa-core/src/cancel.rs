//! Cooperative cancellation of storage round trips.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Runs `round_trip` unless `cancel` fires first.
///
/// The token is polled before the round trip, so an already cancelled
/// token never starts it.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, stage: &str, round_trip: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(stage, "Query cancelled");
            Err(Error::Cancelled(stage.to_string()))
        }
        result = round_trip => result,
    }
}
