//! Per-lead roof analysis.
//!
//! Leads are enriched strictly one at a time, in discovery order, with a
//! fixed pause between requests. Each lead gets its own retry budget and a
//! failed lead never stops the loop.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer};
use tracing::{info, instrument, warn};

use roofscout_provider::InferenceProvider;
use roofscout_shared::{EnrichmentFields, Lead, Result, RoofCondition, RoofScoutError};

use crate::retry::{RetryExecutor, RetryNotice};

// ---------------------------------------------------------------------------
// Response schema
// ---------------------------------------------------------------------------

/// Shape the inference provider is asked to answer with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoofAnalysis {
    roof_type: String,
    #[serde(deserialize_with = "string_or_number")]
    estimated_sq_ft: String,
    #[serde(deserialize_with = "string_or_number")]
    estimated_age: String,
    roof_condition: String,
    #[serde(default)]
    notes: Option<String>,
}

/// Providers sometimes answer numeric-looking fields with bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Decode a provider answer into enrichment fields.
///
/// Anything that does not match the schema, including a condition outside
/// Excellent/Good/Fair/Poor, yields [`EnrichmentFields::fallback`].
pub fn parse_roof_analysis(text: &str) -> EnrichmentFields {
    let analysis: RoofAnalysis = match serde_json::from_str(text.trim()) {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "unparsable roof analysis, using fallback");
            return EnrichmentFields::fallback();
        }
    };

    let condition: RoofCondition = match analysis.roof_condition.parse() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "roof analysis has invalid condition, using fallback");
            return EnrichmentFields::fallback();
        }
    };

    EnrichmentFields {
        roof_type: Some(analysis.roof_type),
        estimated_sq_ft: Some(analysis.estimated_sq_ft),
        estimated_age: Some(analysis.estimated_age),
        roof_condition: Some(condition),
        notes: analysis.notes.filter(|n| !n.trim().is_empty()),
    }
}

/// Natural-language request for one lead.
pub fn roof_prompt(lead: &Lead) -> String {
    format!(
        "Analyze the commercial roof at {}. We need data for roof preservation targeting. Provide:\n\
         1. Precise Roof Material (e.g., TPO, EPDM, Mod-Bit).\n\
         2. Estimated Square Footage (Numeric estimate).\n\
         3. Estimated Roof Age.\n\
         4. Current condition (Excellent, Good, Fair, Poor).",
        lead.business_name
    )
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Callbacks fired by [`EnrichmentStage::enrich_all`].
pub trait EnrichmentProgress: Send + Sync {
    /// A lead is about to be analyzed.
    fn lead_started(&self, index: usize, lead: &Lead);
    /// The analysis call for a lead hit a rate limit and is backing off.
    fn lead_backoff(&self, index: usize, lead: &Lead, notice: RetryNotice);
    /// A lead finished, successfully or not. `error` is set on failure.
    fn lead_finished(&self, index: usize, lead: &Lead, error: Option<&RoofScoutError>);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn lead_started(&self, _index: usize, _lead: &Lead) {}
    fn lead_backoff(&self, _index: usize, _lead: &Lead, _notice: RetryNotice) {}
    fn lead_finished(&self, _index: usize, _lead: &Lead, _error: Option<&RoofScoutError>) {}
}

/// Tally of one enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub enriched: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Sequential, paced enrichment of discovered leads.
pub struct EnrichmentStage<'a> {
    provider: &'a dyn InferenceProvider,
    retry: &'a RetryExecutor,
    pacing: Duration,
}

impl<'a> EnrichmentStage<'a> {
    pub fn new(
        provider: &'a dyn InferenceProvider,
        retry: &'a RetryExecutor,
        pacing: Duration,
    ) -> Self {
        Self {
            provider,
            retry,
            pacing,
        }
    }

    /// Analyze a single lead under its own retry budget.
    ///
    /// Errors are returned only when the call itself fails; a malformed
    /// answer degrades to the fallback fields instead.
    pub async fn enrich_one<R: Rng>(
        &self,
        lead: &Lead,
        rng: &mut R,
        on_retry: impl FnMut(RetryNotice),
    ) -> Result<EnrichmentFields> {
        let prompt = roof_prompt(lead);
        let text = self
            .retry
            .execute(rng, || self.provider.analyze(&prompt), on_retry)
            .await?;
        Ok(parse_roof_analysis(&text))
    }

    /// Enrich every lead in place, in order.
    ///
    /// Successful results are merged into the lead; failures are logged and
    /// the lead keeps its pending fields. The stage sleeps for the pacing
    /// interval between consecutive leads whatever the outcome.
    #[instrument(skip_all, fields(leads = leads.len()))]
    pub async fn enrich_all<R: Rng>(
        &self,
        leads: &mut [Lead],
        rng: &mut R,
        progress: &dyn EnrichmentProgress,
    ) -> EnrichmentSummary {
        let mut summary = EnrichmentSummary::default();
        let total = leads.len();

        for index in 0..total {
            if index > 0 {
                tokio::time::sleep(self.pacing).await;
            }

            let lead = &leads[index];
            progress.lead_started(index, lead);

            let result = self
                .enrich_one(lead, &mut *rng, |notice| {
                    progress.lead_backoff(index, lead, notice)
                })
                .await;

            match result {
                Ok(fields) => {
                    let lead = &mut leads[index];
                    lead.merge(fields);
                    summary.enriched += 1;
                    progress.lead_finished(index, lead, None);
                }
                Err(e) => {
                    let lead = &leads[index];
                    warn!(
                        index,
                        lead = %lead.business_name,
                        error = %e,
                        "roof analysis failed, keeping pending fields"
                    );
                    summary.failed += 1;
                    progress.lead_finished(index, lead, Some(&e));
                }
            }
        }

        info!(
            enriched = summary.enriched,
            failed = summary.failed,
            "enrichment pass complete"
        );
        summary
    }
}
