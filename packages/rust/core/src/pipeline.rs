//! End-to-end scan: region → discovery → enrichment → leads.
//!
//! [`PipelineController`] owns the run state. Every stage event is folded
//! into a [`ProgressSnapshot`] by [`reduce`] and published on a
//! `tokio::sync::watch` channel, which observers poll or subscribe to.

use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use roofscout_provider::{InferenceProvider, SearchProvider};
use roofscout_shared::{
    Lead, PipelineConfig, ProgressSnapshot, Region, Result, RoofScoutError, RunStatus,
};

use crate::discovery::DiscoveryStage;
use crate::enrichment::{EnrichmentProgress, EnrichmentStage};
use crate::retry::{RetryExecutor, RetryNotice, RetryPolicy};

pub const NO_LEADS_MESSAGE: &str = "No leads found in initial sweep. Try again.";
pub const QUOTA_MESSAGE: &str = "Quota exhausted. Please wait a moment and try again.";
pub const FAILURE_MESSAGE: &str = "System failure during scan. Check credentials.";

// ---------------------------------------------------------------------------
// Progress reducer
// ---------------------------------------------------------------------------

/// Everything that can change the progress snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A run began; `nominal_total` is a placeholder until discovery finishes.
    RunStarted { region: Region, nominal_total: usize },
    /// Free-text status update; counters are untouched.
    Message(String),
    /// Discovery returned nothing. The run ends back in `Idle`.
    NothingFound,
    /// Discovery returned `count >= 1` leads.
    Discovered { count: usize },
    /// One lead left the enrichment loop.
    LeadProcessed { succeeded: bool },
    /// The enrichment loop finished.
    Completed,
    /// The run aborted.
    Failed { rate_limited: bool },
}

/// Pure state transition.
///
/// Counter updates are clamped so `current <= total`, and lead events that
/// arrive outside `Analyzing` are ignored.
pub fn reduce(snapshot: &ProgressSnapshot, event: ProgressEvent) -> ProgressSnapshot {
    match event {
        ProgressEvent::RunStarted {
            region,
            nominal_total,
        } => ProgressSnapshot {
            total: nominal_total,
            current: 0,
            failed: 0,
            status: RunStatus::Searching,
            message: format!("Initializing Deep-Scan Protocols for {}...", region.city),
        },
        ProgressEvent::Message(message) => ProgressSnapshot {
            message,
            ..snapshot.clone()
        },
        ProgressEvent::NothingFound => ProgressSnapshot {
            total: 0,
            current: 0,
            failed: 0,
            status: RunStatus::Idle,
            message: NO_LEADS_MESSAGE.to_string(),
        },
        ProgressEvent::Discovered { count } => ProgressSnapshot {
            total: count,
            current: 0,
            failed: 0,
            status: RunStatus::Analyzing,
            message: "Lead Discovery successful. Beginning detailed roof analysis...".to_string(),
        },
        ProgressEvent::LeadProcessed { succeeded } => {
            if snapshot.status != RunStatus::Analyzing {
                return snapshot.clone();
            }
            ProgressSnapshot {
                current: (snapshot.current + 1).min(snapshot.total),
                failed: snapshot.failed + usize::from(!succeeded),
                ..snapshot.clone()
            }
        }
        ProgressEvent::Completed => {
            let secured = snapshot.total - snapshot.failed.min(snapshot.total);
            let message = if snapshot.failed == 0 {
                format!("Scan finished. {} commercial leads secured.", snapshot.total)
            } else {
                format!(
                    "Scan finished. {secured} commercial leads secured, {} need manual review.",
                    snapshot.failed
                )
            };
            ProgressSnapshot {
                status: RunStatus::Completed,
                message,
                ..snapshot.clone()
            }
        }
        ProgressEvent::Failed { rate_limited } => ProgressSnapshot {
            status: RunStatus::Error,
            message: if rate_limited {
                QUOTA_MESSAGE
            } else {
                FAILURE_MESSAGE
            }
            .to_string(),
            ..snapshot.clone()
        },
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Leads in discovery order, enriched where possible.
    pub leads: Vec<Lead>,
    /// `Completed`, or `Idle` when discovery found nothing.
    pub status: RunStatus,
    pub enriched: usize,
    pub failed: usize,
    pub elapsed: std::time::Duration,
}

/// Sequences discovery and enrichment and owns the progress snapshot.
pub struct PipelineController {
    search: Arc<dyn SearchProvider>,
    inference: Arc<dyn InferenceProvider>,
    config: PipelineConfig,
    retry: RetryExecutor,
    /// Held for the whole run; doubles as the single-run guard.
    rng: Mutex<StdRng>,
    progress: watch::Sender<ProgressSnapshot>,
}

impl PipelineController {
    /// Create a controller seeded from OS entropy.
    pub fn new(
        search: Arc<dyn SearchProvider>,
        inference: Arc<dyn InferenceProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_rng(search, inference, config, StdRng::from_os_rng())
    }

    /// Create a controller with a fixed seed for reproducible jitter.
    pub fn with_seed(
        search: Arc<dyn SearchProvider>,
        inference: Arc<dyn InferenceProvider>,
        config: PipelineConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(search, inference, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        search: Arc<dyn SearchProvider>,
        inference: Arc<dyn InferenceProvider>,
        config: PipelineConfig,
        rng: StdRng,
    ) -> Self {
        let retry = RetryExecutor::new(RetryPolicy::from(&config));
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        Self {
            search,
            inference,
            config,
            retry,
            rng: Mutex::new(rng),
            progress,
        }
    }

    /// Current snapshot, for polling observers.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    /// Receiver notified after every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    fn emit(&self, event: ProgressEvent) {
        debug!(?event, "progress event");
        self.progress.send_modify(|snapshot| *snapshot = reduce(snapshot, event));
    }

    /// Run one full scan of `region`.
    ///
    /// Returns [`RoofScoutError::RunInProgress`] without touching the
    /// snapshot if another run is still in flight. Discovery failures end
    /// the run in `Error` and are returned; enrichment failures never are.
    #[instrument(skip_all, fields(region = %region))]
    pub async fn run(&self, region: &Region) -> Result<RunOutcome> {
        let Ok(mut rng) = self.rng.try_lock() else {
            warn!("scan requested while another is in flight");
            return Err(RoofScoutError::RunInProgress);
        };
        let start = Instant::now();

        info!("starting scan");
        self.emit(ProgressEvent::RunStarted {
            region: region.clone(),
            nominal_total: self.config.nominal_total,
        });

        // --- Phase 1: Discovery ---
        let discovery = DiscoveryStage::new(self.search.as_ref(), &self.retry, &self.config.origin);
        let discovered = discovery
            .discover(region, &mut *rng, &mut |message: String| {
                self.emit(ProgressEvent::Message(message))
            })
            .await;

        let mut leads = match discovered {
            Ok(leads) => leads,
            Err(e) => {
                error!(error = %e, "discovery failed");
                self.emit(ProgressEvent::Failed {
                    rate_limited: e.is_rate_limit(),
                });
                return Err(e);
            }
        };

        if leads.is_empty() {
            info!("discovery found no leads");
            self.emit(ProgressEvent::NothingFound);
            return Ok(RunOutcome {
                leads,
                status: RunStatus::Idle,
                enriched: 0,
                failed: 0,
                elapsed: start.elapsed(),
            });
        }

        self.emit(ProgressEvent::Discovered { count: leads.len() });

        // --- Phase 2: Enrichment ---
        let enrichment =
            EnrichmentStage::new(self.inference.as_ref(), &self.retry, self.config.pacing);
        let summary = enrichment
            .enrich_all(&mut leads, &mut *rng, &ControllerProgress { controller: self })
            .await;

        self.emit(ProgressEvent::Completed);

        let outcome = RunOutcome {
            leads,
            status: RunStatus::Completed,
            enriched: summary.enriched,
            failed: summary.failed,
            elapsed: start.elapsed(),
        };

        info!(
            leads = outcome.leads.len(),
            enriched = outcome.enriched,
            failed = outcome.failed,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "scan complete"
        );

        Ok(outcome)
    }
}

/// Routes enrichment callbacks into the controller's snapshot.
struct ControllerProgress<'a> {
    controller: &'a PipelineController,
}

impl EnrichmentProgress for ControllerProgress<'_> {
    fn lead_started(&self, _index: usize, lead: &Lead) {
        self.controller.emit(ProgressEvent::Message(format!(
            "Analyzing satellite signatures for {}...",
            lead.business_name
        )));
    }

    fn lead_backoff(&self, _index: usize, lead: &Lead, notice: RetryNotice) {
        self.controller.emit(ProgressEvent::Message(format!(
            "Rate limit hit for {}. Backing off {}s...",
            lead.business_name,
            notice.delay.as_secs_f64().round() as u64
        )));
    }

    fn lead_finished(&self, _index: usize, _lead: &Lead, error: Option<&RoofScoutError>) {
        self.controller.emit(ProgressEvent::LeadProcessed {
            succeeded: error.is_none(),
        });
    }
}
