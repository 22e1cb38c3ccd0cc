//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for the Gemini `generateContent` REST API.
//! It implements the `GenerativeBackend` port from the `core` crate.

use async_trait::async_trait;
use documind_core::domain::Role;
use documind_core::ports::{
    Content, GenerateRequest, GenerateResponse, GenerativeBackend, Part, PortError, PortResult,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A `GenerativeBackend` that talks to Gemini over HTTPS.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    /// Creates a new `GeminiBackend`.
    ///
    /// `base_url` is the API root, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    system_instruction: SystemInstruction<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: WireInlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on reasoning summaries, which are not part of the answer.
    #[serde(default)]
    thought: bool,
}

//=========================================================================================
// Mapping
//=========================================================================================

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

fn wire_part(part: &Part) -> WirePart<'_> {
    match part {
        Part::Text(text) => WirePart::Text { text },
        Part::InlineData { mime_type, data } => WirePart::InlineData {
            inline_data: WireInlineData { mime_type, data },
        },
    }
}

fn wire_content(content: &Content) -> WireContent<'_> {
    WireContent {
        role: wire_role(content.role),
        parts: content.parts.iter().map(wire_part).collect(),
    }
}

fn to_wire(request: &GenerateRequest) -> GenerateContentRequest<'_> {
    let config = &request.config;
    let generation_config = (config.temperature.is_some() || config.thinking_budget.is_some())
        .then(|| WireGenerationConfig {
            temperature: config.temperature,
            thinking_config: config
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        });

    GenerateContentRequest {
        contents: request.contents.iter().map(wire_content).collect(),
        system_instruction: SystemInstruction {
            parts: vec![WirePart::Text {
                text: &request.system_instruction,
            }],
        },
        generation_config,
    }
}

/// Concatenate the answer text of the first candidate, skipping thoughts.
fn reply_text(response: GenerateContentResponse) -> Option<String> {
    let parts = response.candidates.into_iter().next()?.content?.parts;
    let texts: Vec<String> = parts
        .into_iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.text)
        .collect();
    (!texts.is_empty()).then(|| texts.concat())
}

//=========================================================================================
// `GenerativeBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse> {
        debug!(
            model = %request.model,
            turns = request.contents.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&to_wire(&request))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %request.model, %status, "Gemini API returned an error");
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(PortError::RateLimited);
            }
            return Err(PortError::Rejected(format!(
                "Gemini API error {}: {}",
                status, body
            )));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PortError::Serialization(format!("Failed to parse response: {e}")))?;

        Ok(GenerateResponse {
            text: reply_text(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use documind_core::ports::GenerationConfig;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(config: GenerationConfig) -> GenerateRequest {
        GenerateRequest {
            model: "fast-model".into(),
            contents: vec![
                Content {
                    role: Role::User,
                    parts: vec![
                        Part::InlineData {
                            mime_type: "image/png".into(),
                            data: Arc::from("aGVsbG8="),
                        },
                        Part::text("What is shown?"),
                    ],
                },
                Content::text(Role::Model, "A chart."),
            ],
            system_instruction: "Be precise.".into(),
            config,
        }
    }

    fn backend(server: &MockServer) -> GeminiBackend {
        GeminiBackend::new("test-key", server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn reply(parts: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "role": "model", "parts": parts } }]
        }))
    }

    #[tokio::test]
    async fn posts_the_native_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/fast-model:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(reply(json!([{ "text": "ok" }])))
            .expect(1)
            .mount(&server)
            .await;

        let config = GenerationConfig {
            temperature: None,
            thinking_budget: Some(32768),
        };
        backend(&server).generate(request(config)).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = received[0].body_json().unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    {
                        "role": "user",
                        "parts": [
                            { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } },
                            { "text": "What is shown?" }
                        ]
                    },
                    { "role": "model", "parts": [{ "text": "A chart." }] }
                ],
                "systemInstruction": { "parts": [{ "text": "Be precise." }] },
                "generationConfig": { "thinkingConfig": { "thinkingBudget": 32768 } }
            })
        );
    }

    #[tokio::test]
    async fn omits_generation_config_when_nothing_is_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply(json!([{ "text": "ok" }])))
            .mount(&server)
            .await;

        backend(&server)
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = received[0].body_json().unwrap();
        assert!(body.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn joins_answer_parts_and_skips_thoughts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply(json!([
                { "text": "Let me check the pages.", "thought": true },
                { "text": "Revenue grew " },
                { "text": "[Page 2]." }
            ])))
            .mount(&server)
            .await;

        let response = backend(&server)
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap();
        assert_eq!(response.text.as_deref(), Some("Revenue grew [Page 2]."));
    }

    #[tokio::test]
    async fn missing_candidates_yield_no_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let response = backend(&server)
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap();
        assert_eq!(response.text, None);
    }

    #[tokio::test]
    async fn quota_exhaustion_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = backend(&server)
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap_err();
        assert_eq!(err, PortError::RateLimited);
    }

    #[tokio::test]
    async fn other_failures_map_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Rejected(msg) if msg.contains("bad payload")));
    }

    #[tokio::test]
    async fn unreachable_backend_maps_to_unavailable() {
        // Grab a free port, then close it so nothing is listening there.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let backend =
            GeminiBackend::new("test-key", format!("http://{addr}"), Duration::from_secs(2))
                .unwrap();
        let err = backend
            .generate(request(GenerationConfig::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_)));
    }
}
