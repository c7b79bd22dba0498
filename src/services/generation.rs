use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{GenerationError, GenerationResult};
use crate::core::types::ImagePayload;
use crate::services::prompt::InstructionPayload;
use crate::utils::Metrics;

/// Boundary contract for the external image-generation call.
///
/// The batch controller only knows this trait; tests substitute scripted
/// implementations so sweep semantics can be verified without the network.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        image: &ImagePayload,
        instructions: &InstructionPayload,
    ) -> GenerationResult<ImagePayload>;
}

/// Gemini image-generation client with timeouts, retries, and metrics.
pub struct GeminiClient {
    config: Arc<Config>,
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

impl GeminiClient {
    pub fn new(config: Arc<Config>, metrics: Option<Metrics>) -> GenerationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            metrics,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.config.image_model(),
            self.config.api_key()
        )
    }

    fn request_body(image: &ImagePayload, instructions: &InstructionPayload) -> serde_json::Value {
        let base64_image = general_purpose::STANDARD.encode(image.bytes.as_slice());
        serde_json::json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": image.media_type,
                            "data": base64_image
                        }
                    },
                    { "text": instructions.user_text() }
                ]
            }],
            "systemInstruction": {
                "parts": [{ "text": instructions.system_directive }]
            }
        })
    }

    /// Send HTTP request with retries and jitter.
    ///
    /// 429/503 wait a flat 10s; other failures back off exponentially. Only
    /// transport-level problems are retried here; a well-formed response that
    /// carries no image is a terminal failure for the attempt.
    async fn send_with_retries(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> GenerationResult<String> {
        let max_retries = self.config.max_retries();

        for attempt in 0..=max_retries {
            match self
                .http_client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        return response.text().await.map_err(GenerationError::from);
                    }

                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();
                    let is_rate_limit = status.as_u16() == 429;
                    let is_overload = status.as_u16() == 503;

                    if attempt < max_retries {
                        debug!(
                            "generation request failed with status {}: {}. Retrying ({}/{})",
                            status,
                            error_text,
                            attempt + 1,
                            max_retries
                        );
                        if let Some(ref m) = self.metrics {
                            m.record_generation_retry();
                        }
                        if is_rate_limit || is_overload {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                        } else {
                            let base_delay = 2_u64.pow(attempt);
                            let jitter = rand::random::<u64>() % 1000;
                            tokio::time::sleep(Duration::from_millis(base_delay * 1000 + jitter))
                                .await;
                        }
                        continue;
                    }
                    return Err(GenerationError::Transport(format!(
                        "{status} - {error_text}"
                    )));
                }
                Err(e) => {
                    if attempt < max_retries {
                        debug!(
                            "HTTP request error: {}. Retrying ({}/{})",
                            e,
                            attempt + 1,
                            max_retries
                        );
                        if let Some(ref m) = self.metrics {
                            m.record_generation_retry();
                        }
                        let base_delay = 2_u64.pow(attempt);
                        let jitter = rand::random::<u64>() % 1000;
                        tokio::time::sleep(Duration::from_millis(base_delay * 1000 + jitter))
                            .await;
                        continue;
                    }
                    return Err(GenerationError::from(e));
                }
            }
        }

        Err(GenerationError::Transport(format!(
            "failed after {max_retries} retries"
        )))
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    #[instrument(skip(self, image, instructions), fields(bytes = image.bytes.len()))]
    async fn generate(
        &self,
        image: &ImagePayload,
        instructions: &InstructionPayload,
    ) -> GenerationResult<ImagePayload> {
        let start = Instant::now();
        let body = Self::request_body(image, instructions);

        let result = self.send_with_retries(&self.endpoint(), &body).await;
        let duration = start.elapsed();

        let response_text = match result {
            Ok(text) => text,
            Err(e) => {
                if let Some(ref m) = self.metrics {
                    m.record_generation_call(false, duration);
                }
                return Err(e);
            }
        };

        let response: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|_| GenerationError::MalformedResponse)?;

        let parsed = extract_image(&response);
        if let Some(ref m) = self.metrics {
            m.record_generation_call(parsed.is_ok(), duration);
        }
        if let Err(ref e) = parsed {
            warn!("generation response carried no image: {e}");
        }
        parsed
    }
}

/// Pull the generated image out of a `generateContent` response.
///
/// No candidates is its own failure, a text-only part means the model
/// declined (safety filters and the like), anything else without an image
/// part is malformed.
pub fn extract_image(response: &serde_json::Value) -> GenerationResult<ImagePayload> {
    let candidates = response["candidates"]
        .as_array()
        .filter(|c| !c.is_empty())
        .ok_or(GenerationError::NoCandidates)?;

    let parts = candidates[0]["content"]["parts"]
        .as_array()
        .ok_or(GenerationError::MalformedResponse)?;

    for part in parts {
        if let Some(data) = part["inline_data"]["data"].as_str() {
            let bytes = general_purpose::STANDARD
                .decode(data)
                .map_err(|_| GenerationError::MalformedResponse)?;
            let media_type = part["inline_data"]["mime_type"]
                .as_str()
                .unwrap_or("image/png")
                .to_string();
            return Ok(ImagePayload::new(bytes, media_type));
        }
    }

    // Fallback check: the model may return explanatory text instead of an image
    if let Some(text) = parts.iter().find_map(|p| p["text"].as_str()) {
        return Err(GenerationError::ModelDeclined(text.to_string()));
    }

    Err(GenerationError::MalformedResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_response(data: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inline_data": { "mime_type": "image/png", "data": data }
                    }]
                }
            }]
        })
    }

    #[test]
    fn extracts_inline_image_data() {
        let bytes = vec![7u8, 8, 9];
        let encoded = general_purpose::STANDARD.encode(&bytes);
        let payload = extract_image(&image_response(&encoded)).unwrap();
        assert_eq!(*payload.bytes, bytes);
        assert_eq!(payload.media_type, "image/png");
    }

    #[test]
    fn empty_candidates_is_no_candidates() {
        let response = json!({ "candidates": [] });
        assert!(matches!(
            extract_image(&response),
            Err(GenerationError::NoCandidates)
        ));
    }

    #[test]
    fn missing_candidates_is_no_candidates() {
        let response = json!({ "promptFeedback": {} });
        assert!(matches!(
            extract_image(&response),
            Err(GenerationError::NoCandidates)
        ));
    }

    #[test]
    fn text_only_part_means_model_declined() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "I can't colorize this image." }]
                }
            }]
        });
        match extract_image(&response) {
            Err(GenerationError::ModelDeclined(msg)) => {
                assert!(msg.contains("can't colorize"))
            }
            other => panic!("expected ModelDeclined, got {other:?}"),
        }
    }

    #[test]
    fn imageless_parts_are_malformed() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "functionCall": {} }] } }]
        });
        assert!(matches!(
            extract_image(&response),
            Err(GenerationError::MalformedResponse)
        ));
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            extract_image(&image_response("not-base64!!!")),
            Err(GenerationError::MalformedResponse)
        ));
    }

    #[test]
    fn request_body_carries_system_and_user_parts() {
        let image = ImagePayload::new(vec![1, 2], "image/jpeg");
        let instructions = crate::services::prompt::build(
            &Default::default(),
            crate::core::types::AttemptMode::Initial,
            &Default::default(),
        );
        let body = GeminiClient::request_body(&image, &instructions);
        assert_eq!(
            body["contents"][0]["parts"][0]["inline_data"]["mime_type"],
            "image/jpeg"
        );
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("professional colorist"));
    }
}
