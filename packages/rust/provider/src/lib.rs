//! Remote collaborators for a RoofScout scan.
//!
//! The pipeline talks to two opaque services: a grounded search provider
//! that returns candidate properties for a region, and an inference provider
//! that answers a free-form prompt. Both are traits so the core can be
//! driven by in-memory fakes; [`GeminiClient`] implements both against the
//! Gemini `generateContent` API.

mod gemini;
mod grounding;

use async_trait::async_trait;
use roofscout_shared::{Region, Result};

pub use gemini::GeminiClient;
pub use grounding::{SearchHit, parse_search_hits};

/// Bulk search for candidate properties within a region.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return validated hits in provider order. Malformed items are already dropped.
    async fn search(&self, region: &Region) -> Result<Vec<SearchHit>>;
}

/// Single-shot structured inference.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Send `prompt` and return the raw response text, unparsed.
    async fn analyze(&self, prompt: &str) -> Result<String>;
}
