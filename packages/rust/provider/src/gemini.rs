//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use roofscout_shared::{GeminiConfig, OriginConfig, Region, Result, RoofScoutError};

use crate::grounding::{GenerateContentResponse, SearchHit, parse_search_hits};
use crate::{InferenceProvider, SearchProvider};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("RoofScout/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: Url,
    discovery_model: String,
    enrichment_model: String,
    /// Lat/lng hint sent with grounded searches.
    retrieval_origin: (f64, f64),
}

impl GeminiClient {
    /// Build a client from the `[gemini]` config section.
    pub fn new(api_key: impl Into<String>, config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RoofScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        let origin = OriginConfig::default();
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url()?,
            discovery_model: config.discovery_model.clone(),
            enrichment_model: config.enrichment_model.clone(),
            retrieval_origin: (origin.latitude, origin.longitude),
        })
    }

    /// Override the lat/lng hint used to bias grounded searches.
    pub fn with_retrieval_origin(mut self, origin: &OriginConfig) -> Self {
        self.retrieval_origin = (origin.latitude, origin.longitude);
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// POST a request body and decode the response envelope.
    async fn generate(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model);
        debug!(%url, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RoofScoutError::Network(format!("{model}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RoofScoutError::Network(format!("{model}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(RoofScoutError::from_status(
                status.as_u16(),
                error_message(&text),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            RoofScoutError::parse(format!(
                "invalid generateContent response: {e} (got: {})",
                text.chars().take(200).collect::<String>()
            ))
        })
    }
}

/// Pull `error.status: error.message` out of a Google error body, falling
/// back to the raw body.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    match error {
        Some(err) => {
            let status = err.get("status").and_then(|s| s.as_str()).unwrap_or("");
            let message = err.get("message").and_then(|s| s.as_str()).unwrap_or("");
            if status.is_empty() {
                message.to_string()
            } else {
                format!("{status}: {message}")
            }
        }
        None => body.chars().take(200).collect(),
    }
}

fn search_prompt(region: &Region) -> String {
    format!(
        "Perform an exhaustive search for commercial industrial parks, large distribution \
         centers, manufacturing facilities, and corporate office complexes in {}, {}. Focus on \
         properties with large roof surface areas (over 20,000 sq ft). Provide details for as \
         many as possible (aiming for a high-density lead list). These are for roof \
         preservation services.",
        region.city, region.state
    )
}

#[async_trait]
impl SearchProvider for GeminiClient {
    #[instrument(skip_all, fields(region = %region, model = %self.discovery_model))]
    async fn search(&self, region: &Region) -> Result<Vec<SearchHit>> {
        let (latitude, longitude) = self.retrieval_origin;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": search_prompt(region) }] }],
            "tools": [{ "googleMaps": {} }],
            "toolConfig": {
                "retrievalConfig": {
                    "latLng": { "latitude": latitude, "longitude": longitude }
                }
            }
        });

        let response = self.generate(&self.discovery_model, body).await?;
        let chunks = response.grounding_chunks();
        let hits = parse_search_hits(chunks);

        info!(raw = chunks.len(), kept = hits.len(), "grounded search returned");
        Ok(hits)
    }
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    #[instrument(skip_all, fields(model = %self.enrichment_model))]
    async fn analyze(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "roofType": { "type": "STRING" },
                        "estimatedSqFt": { "type": "STRING" },
                        "estimatedAge": { "type": "STRING" },
                        "roofCondition": {
                            "type": "STRING",
                            "description": "Must be one of: Excellent, Good, Fair, Poor"
                        },
                        "notes": { "type": "STRING" }
                    },
                    "required": ["roofType", "estimatedSqFt", "estimatedAge", "roofCondition"]
                }
            }
        });

        let response = self.generate(&self.enrichment_model, body).await?;
        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig {
            base_url: format!("{}/v1beta", server.uri()),
            ..GeminiConfig::default()
        };
        GeminiClient::new("test-key", &config).expect("build client")
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(body), "RESOURCE_EXHAUSTED: Quota exceeded");
        assert_eq!(error_message("upstream connect error"), "upstream connect error");
    }

    #[tokio::test]
    async fn search_parses_grounding_chunks() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Here are some facilities." }] },
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "maps": { "uri": "https://maps.google.com/?cid=1", "title": "Allegheny Steel" } },
                            { "maps": { "title": "Missing Locator LLC" } },
                            { "maps": { "uri": "https://maps.google.com/?cid=3", "title": "Strip District Cold Storage" } }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let hits = client_for(&server)
            .search(&Region::new("Pittsburgh", "PA"))
            .await
            .expect("search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("Allegheny Steel"));
        assert_eq!(hits[1].title.as_deref(), Some("Strip District Cold Storage"));
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze("Analyze the roof")
            .await
            .unwrap_err();

        assert!(matches!(err, RoofScoutError::RateLimited { status: 429, .. }));
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn other_http_errors_are_not_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search(&Region::new("Pittsburgh", "PA"))
            .await
            .unwrap_err();

        assert!(matches!(err, RoofScoutError::Provider { status: 403, .. }));
        assert!(!err.is_rate_limit());
    }

    #[tokio::test]
    async fn non_json_body_with_multibyte_text_is_a_parse_error() {
        let server = MockServer::start().await;
        // 'é' occupies bytes 199..201, straddling the excerpt cut-off
        let body = format!("{}é trailing garbage", "a".repeat(199));

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let err = client_for(&server).analyze("Analyze").await.unwrap_err();

        assert!(matches!(err, RoofScoutError::Parse { .. }));
        assert!(!err.is_rate_limit());
    }

    #[tokio::test]
    async fn analyze_returns_raw_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-3-flash-preview:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"roofType\":\"TPO\"}" }] }
                }]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).analyze("Analyze").await.expect("analyze");
        assert_eq!(text, "{\"roofType\":\"TPO\"}");
    }
}
