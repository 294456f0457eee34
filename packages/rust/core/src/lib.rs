//! Scan orchestration for RoofScout.
//!
//! Ties the provider traits together into the two-stage scan: a bulk
//! grounded search ([`discovery`]) followed by per-lead roof analysis
//! ([`enrichment`]), both under the shared [`retry`] policy and driven by
//! the [`pipeline::PipelineController`].

pub mod discovery;
pub mod enrichment;
pub mod pipeline;
pub mod retry;
pub mod stats;

pub use discovery::DiscoveryStage;
pub use enrichment::{
    EnrichmentProgress, EnrichmentStage, EnrichmentSummary, SilentEnrichmentProgress,
};
pub use pipeline::{PipelineController, ProgressEvent, RunOutcome, reduce};
pub use retry::{RateLimitSignal, RetryExecutor, RetryNotice, RetryPolicy};
pub use stats::ScanStats;
