//! Discovery stage: one grounded search per run, mapped into pending leads.

use rand::Rng;
use tracing::{info, instrument};

use roofscout_provider::{SearchHit, SearchProvider};
use roofscout_shared::{Lead, OriginConfig, Region, Result};

use crate::retry::{RetryExecutor, RetryNotice};

/// Runs the bulk search and turns hits into [`Lead`]s.
pub struct DiscoveryStage<'a> {
    provider: &'a dyn SearchProvider,
    retry: &'a RetryExecutor,
    origin: &'a OriginConfig,
}

impl<'a> DiscoveryStage<'a> {
    pub fn new(
        provider: &'a dyn SearchProvider,
        retry: &'a RetryExecutor,
        origin: &'a OriginConfig,
    ) -> Self {
        Self {
            provider,
            retry,
            origin,
        }
    }

    /// Search `region` and return one pending lead per usable hit, in
    /// provider order.
    ///
    /// The search call runs under its own retry budget. An empty list is a
    /// valid answer; any error (after retries) propagates with no partial
    /// results.
    #[instrument(skip_all, fields(region = %region))]
    pub async fn discover<R: Rng>(
        &self,
        region: &Region,
        rng: &mut R,
        on_progress: &mut (dyn FnMut(String) + Send),
    ) -> Result<Vec<Lead>> {
        on_progress(format!(
            "Scanning {} for high-value commercial assets...",
            region.city
        ));

        let hits = self
            .retry
            .execute(
                &mut *rng,
                || self.provider.search(region),
                |notice: RetryNotice| {
                    on_progress(format!(
                        "Rate limit reached. Cooling down... Retrying in {}s (Attempt {})",
                        notice.delay.as_secs_f64().round() as u64,
                        notice.attempt
                    ));
                },
            )
            .await?;

        let leads: Vec<Lead> = hits
            .into_iter()
            .map(|hit| self.lead_from_hit(hit, region, rng))
            .collect();

        info!(leads = leads.len(), "discovery complete");
        Ok(leads)
    }

    fn lead_from_hit<R: Rng>(&self, hit: SearchHit, region: &Region, rng: &mut R) -> Lead {
        let name = hit
            .title
            .unwrap_or_else(|| format!("Commercial Asset {}", hit.position));
        Lead::pending(name, hit.uri, region, placeholder_coordinates(self.origin, rng))
    }
}

/// Scatter a point uniformly in a `spread`-wide box centred on the origin.
///
/// These coordinates are illustrative only; they are not derived from the
/// search result.
pub fn placeholder_coordinates<R: Rng>(origin: &OriginConfig, rng: &mut R) -> (f64, f64) {
    let half = origin.spread / 2.0;
    if !half.is_finite() || half <= 0.0 {
        return (origin.latitude, origin.longitude);
    }
    (
        origin.latitude + rng.random_range(-half..half),
        origin.longitude + rng.random_range(-half..half),
    )
}
