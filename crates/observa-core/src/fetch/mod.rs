//! Batched hydration of matched observations.
//!
//! Ids are read first with an id-only projection, then hydrated in fixed
//! size batches, one round trip at a time on the matching set's session.


use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cancel::guarded;
use crate::error::{Error, Result};
use crate::matching::MatchingSet;
use crate::model::{IndicatorId, ObservationRow};

/// Default number of observations per hydration round trip.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Phase durations of one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchTimings {
    /// Id-only projection.
    pub id_fetch: Duration,
    /// One entry per hydrated batch.
    pub batches: Vec<Duration>,
    /// Whole fetch.
    pub total: Duration,
}

/// Hydrated rows plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FetchedObservations {
    /// Rows in ascending id order.
    pub observations: Vec<ObservationRow>,
    /// Phase timings.
    pub timings: FetchTimings,
}

/// Hydrates a [`MatchingSet`] in batches.
#[derive(Debug, Clone)]
pub struct ObservationBatchFetcher {
    batch_size: usize,
}

impl Default for ObservationBatchFetcher {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ObservationBatchFetcher {
    /// Creates a fetcher hydrating `batch_size` rows per round trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidQuery("batch size must be greater than 0".to_string()));
        }
        Ok(Self { batch_size })
    }

    /// Returns the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fetches every matched observation.
    ///
    /// `indicator_ids` restricts the returned measures; empty keeps all.
    ///
    /// # Errors
    ///
    /// Fails on storage errors or when `cancel` fires between batches.
    pub async fn fetch(
        &self,
        set: &mut MatchingSet,
        indicator_ids: &[IndicatorId],
        cancel: &CancellationToken,
    ) -> Result<FetchedObservations> {
        let started = Instant::now();
        let mut timings = FetchTimings::default();

        let phase = Instant::now();
        let mut ids = guarded(cancel, "fetch ids", set.ids()).await?;
        ids.sort_unstable();
        timings.id_fetch = phase.elapsed();

        let mut observations = Vec::with_capacity(ids.len());
        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            let phase = Instant::now();
            let mut rows = guarded(cancel, "hydrate batch", set.hydrate(batch)).await?;
            for row in &mut rows {
                row.retain_indicators(indicator_ids);
            }
            observations.append(&mut rows);
            timings.batches.push(phase.elapsed());
            tracing::trace!(batch = index, size = batch.len(), "Hydrated batch");
        }

        timings.total = started.elapsed();
        tracing::debug!(
            observations = observations.len(),
            batches = timings.batches.len(),
            elapsed_ms = timings.total.as_millis() as u64,
            "Fetched observations"
        );
        Ok(FetchedObservations {
            observations,
            timings,
        })
    }
}
