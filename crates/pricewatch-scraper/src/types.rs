use pricewatch_core::{FetchKey, Marketplace};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{FailureKind, FetchError};

/// Outcome of one marketplace lookup for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub marketplace: Marketplace,
    /// Key the lookup was issued with; results are matched back to items by it.
    pub query: FetchKey,
    /// Marketplace identifier used or discovered, for identifier-keyed marketplaces.
    pub identifier: Option<i64>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success { price: Decimal, volume: i64 },
    Failed { kind: FailureKind, reason: String },
}

impl FetchResult {
    #[must_use]
    pub fn success(
        marketplace: Marketplace,
        query: FetchKey,
        identifier: Option<i64>,
        price: Decimal,
        volume: i64,
    ) -> Self {
        Self {
            marketplace,
            query,
            identifier,
            outcome: FetchOutcome::Success { price, volume },
        }
    }

    #[must_use]
    pub fn failed(
        marketplace: Marketplace,
        query: FetchKey,
        identifier: Option<i64>,
        error: &FetchError,
    ) -> Self {
        Self {
            marketplace,
            query,
            identifier,
            outcome: FetchOutcome::Failed {
                kind: error.kind(),
                reason: error.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success { .. })
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            FetchOutcome::Failed { kind, .. } => Some(*kind),
            FetchOutcome::Success { .. } => None,
        }
    }
}

/// Result of a batch fetch.
///
/// `TotalFailure` means the input was non-empty and not a single lookup
/// succeeded; the caller rolls the batch back instead of dropping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    PartialSuccess(Vec<FetchResult>),
    TotalFailure(Vec<FetchResult>),
}

impl BatchOutcome {
    #[must_use]
    pub fn from_results(results: Vec<FetchResult>) -> Self {
        if !results.is_empty() && !results.iter().any(FetchResult::is_success) {
            BatchOutcome::TotalFailure(results)
        } else {
            BatchOutcome::PartialSuccess(results)
        }
    }

    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        matches!(self, BatchOutcome::TotalFailure(_))
    }

    #[must_use]
    pub fn results(&self) -> &[FetchResult] {
        match self {
            BatchOutcome::PartialSuccess(r) | BatchOutcome::TotalFailure(r) => r,
        }
    }

    #[must_use]
    pub fn into_results(self) -> Vec<FetchResult> {
        match self {
            BatchOutcome::PartialSuccess(r) | BatchOutcome::TotalFailure(r) => r,
        }
    }
}

/// Result of a batch fetch that may stop issuing lookups part-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedBatch {
    pub outcome: BatchOutcome,
    /// Keys never looked up because the gate had closed.
    pub skipped: Vec<FetchKey>,
}

/// Fan-out limits for a marketplace's batch fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum in-flight lookups.
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}
