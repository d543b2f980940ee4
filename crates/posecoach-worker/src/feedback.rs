//! Gemini client for narrative coaching feedback.
//!
//! Turns the per-joint average errors of a comparison into a short
//! paragraph of corrections addressed to the student.

use std::collections::BTreeMap;

use async_trait::async_trait;
use posecoach_models::{Joint, MetricKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};
use crate::services::FeedbackGenerator;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Characters of feedback echoed to the log.
const LOG_PREVIEW_CHARS: usize = 100;

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiFeedback {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiFeedback {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    /// Create from `GEMINI_API_KEY` and `GEMINI_MODEL`.
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| WorkerError::config_error("GEMINI_API_KEY not set"))?;
        let model = std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Self::new(api_key, model))
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_gemini_api(&self, prompt: &str) -> WorkerResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 512,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::feedback_failed(format!("Gemini API request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::feedback_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::feedback_failed(format!("Failed to parse Gemini response: {}", e)))?;

        let text = gemini_response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| WorkerError::feedback_failed("No content in Gemini response"))?;

        Ok(text)
    }
}

#[async_trait]
impl FeedbackGenerator for GeminiFeedback {
    async fn generate(&self, per_joint_average_error: &BTreeMap<Joint, f64>) -> WorkerResult<String> {
        let prompt = build_prompt(per_joint_average_error);
        debug!(model = %self.model, joints = per_joint_average_error.len(), "Requesting feedback");

        let feedback = self.call_gemini_api(&prompt).await?;
        info!(
            model = %self.model,
            "Feedback generated: {}...",
            preview(&feedback, LOG_PREVIEW_CHARS)
        );
        Ok(feedback)
    }
}

/// Prompt listing each joint's average deviation with its unit.
pub fn build_prompt(per_joint_average_error: &BTreeMap<Joint, f64>) -> String {
    let mut errors: Vec<(Joint, f64)> = per_joint_average_error.iter().map(|(j, e)| (*j, *e)).collect();
    errors.sort_by(|a, b| b.1.total_cmp(&a.1));

    let lines = errors
        .iter()
        .map(|(joint, error)| {
            format!(
                "- {}: {}",
                joint.label(),
                MetricKind::for_joint(*joint).format(*error)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a physical education coach reviewing a student's exercise execution.
The student's movement was compared frame by frame against a reference execution.
Below are the average deviations per body joint, largest first. Angles are in degrees,
other joints are distances in normalized image units.

{lines}

Write one short paragraph of personalized feedback for the student:
- Focus on the two or three joints with the largest deviations.
- Give concrete, encouraging corrections.
- Do not repeat the raw numbers and do not use lists or markdown.
"#
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn errors() -> BTreeMap<Joint, f64> {
        let mut errors = BTreeMap::new();
        errors.insert(Joint::LeftKnee, 18.5);
        errors.insert(Joint::LeftWrist, 0.04);
        errors
    }

    #[test]
    fn test_prompt_lists_joints_with_units() {
        let prompt = build_prompt(&errors());
        let knee = prompt.find("18.50°").unwrap();
        let wrist = prompt.find("0.04 units").unwrap();
        assert!(knee < wrist);
    }

    #[test]
    fn test_preview_counts_chars() {
        assert_eq!(preview("ação rápida", 4), "ação");
    }

    #[test]
    #[serial]
    fn test_from_env_requires_key() {
        std::env::remove_var("GEMINI_API_KEY");
        assert!(matches!(GeminiFeedback::from_env(), Err(WorkerError::ConfigError(_))));

        std::env::set_var("GEMINI_API_KEY", "k");
        std::env::remove_var("GEMINI_MODEL");
        assert_eq!(GeminiFeedback::from_env().unwrap().model(), DEFAULT_GEMINI_MODEL);
        std::env::remove_var("GEMINI_API_KEY");
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "  Bend your left knee more. "}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiFeedback::new("secret", "gemini-test").with_base_url(server.uri());
        let feedback = client.generate(&errors()).await.unwrap();
        assert_eq!(feedback, "Bend your left knee more.");
    }

    #[tokio::test]
    async fn test_generate_propagates_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .mount(&server)
            .await;

        let client = GeminiFeedback::new("bad", "gemini-test").with_base_url(server.uri());
        let err = client.generate(&errors()).await.unwrap_err();
        assert!(matches!(err, WorkerError::FeedbackFailed(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = GeminiFeedback::new("k", "gemini-test").with_base_url(server.uri());
        assert!(client.generate(&errors()).await.is_err());
    }
}
