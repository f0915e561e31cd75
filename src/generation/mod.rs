use anyhow::Result;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::GenerationConfig;

/// Client for the generative-language API. One request, one response; no
/// retry — upstream failures are reported to the caller as-is.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    config: GenerationConfig,
    http: reqwest::Client,
}

/// Attachment sent alongside the transcript (e.g. an image or a reference
/// file), inlined as base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data_base64: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: String,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Generate a document from a transcript, an optional instruction
    /// (falls back to the configured default), and optional attachments.
    pub async fn generate(
        &self,
        transcript: &str,
        instruction: Option<&str>,
        attachments: &[Attachment],
    ) -> Result<String> {
        let instruction = instruction.unwrap_or(&self.config.default_instruction);

        let mut parts = vec![json!({
            "text": format!("{}\n\nTranscript:\n{}", instruction, transcript)
        })];
        for attachment in attachments {
            // Validate the payload here so a bad upload is a 4xx at the
            // route layer, not an opaque upstream rejection
            base64::engine::general_purpose::STANDARD
                .decode(&attachment.data_base64)
                .map_err(|e| anyhow::anyhow!("invalid attachment encoding: {}", e))?;
            parts.push(json!({
                "inline_data": {
                    "mime_type": attachment.mime_type,
                    "data": attachment.data_base64,
                }
            }));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );
        let body = json!({ "contents": [{ "parts": parts }] });

        debug!("Requesting generation with {} attachment(s)", attachments.len());
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        let parsed: GenerateResponse = response.json().await?;

        if let Some(err) = parsed.error {
            anyhow::bail!("generation API error: {}", err.message);
        }
        if !status.is_success() {
            anyhow::bail!("generation API returned {}", status);
        }

        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("generation API returned no content");
        }
        Ok(text)
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models?key={}", self.config.base_url, self.config.api_key);
        self.http.get(&url).send().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candidate_response() {
        let raw = r##"{
            "candidates": [{
                "content": {"parts": [{"text": "# Meeting Notes"}, {"text": "\nBody"}]}
            }]
        }"##;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates.unwrap()[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.clone())
            .collect();
        assert_eq!(text, "# Meeting Notes\nBody");
    }

    #[test]
    fn parses_error_response() {
        let raw = r#"{"error": {"message": "API key not valid"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.error.unwrap().message, "API key not valid");
    }
}
