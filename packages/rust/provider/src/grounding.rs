//! Validated parse of raw `generateContent` payloads.
//!
//! Raw provider JSON never leaves this module: grounding chunks are checked
//! here and only well-formed [`SearchHit`]s reach the pipeline.

use serde::Deserialize;
use tracing::debug;

/// One usable search result: a maps locator plus an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// 1-based position among the raw grounding chunks.
    pub position: usize,
    pub title: Option<String>,
    pub uri: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseCandidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MapsChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Grounding chunks of the first candidate, still raw.
    pub fn grounding_chunks(&self) -> &[serde_json::Value] {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or(&[])
    }
}

/// Turn raw grounding chunks into search hits.
///
/// A chunk is kept only if it carries a `maps` object with a non-empty `uri`.
/// Blank titles are normalized to `None`. Order is preserved.
pub fn parse_search_hits(chunks: &[serde_json::Value]) -> Vec<SearchHit> {
    chunks
        .iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let Some(maps) = chunk.get("maps") else {
                debug!(index, "dropping grounding chunk without maps data");
                return None;
            };

            let maps: MapsChunk = match serde_json::from_value(maps.clone()) {
                Ok(m) => m,
                Err(e) => {
                    debug!(index, error = %e, "dropping malformed maps chunk");
                    return None;
                }
            };

            let uri = maps.uri.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
            let Some(uri) = uri else {
                debug!(index, "dropping grounding chunk without locator uri");
                return None;
            };

            Some(SearchHit {
                position: index + 1,
                title: maps
                    .title
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
                uri,
            })
        })
        .collect()
}
