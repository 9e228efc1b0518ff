use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::parsing::*;
use super::MODEL_NAMESPACE_PREFIX;
use crate::resolver::ModelCatalog;

// Listing normally fits in one page; the cap stops a misbehaving token loop.
const MAX_LIST_PAGES: usize = 10;
const LIST_PAGE_SIZE: &str = "1000";

/// Failures of a Gemini call, classified at the client boundary.
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited: {message}")]
    RateLimited { message: String },
    #[error("status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("prompt blocked by safety filter ({reason})")]
    Blocked { reason: String },
    #[error("Gemini returned empty response (finish reason: {finish_reason:?})")]
    EmptyResponse { finish_reason: Option<String> },
    #[error("failed to deserialize: {0}")]
    Decode(String),
}

impl GeminiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GeminiError::RateLimited { .. })
    }
}

/// One part of a user turn.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Blob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

/// Thin client over the Gemini `v1beta` REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Names of every model that supports `generateContent`, in listing order.
    pub async fn list_models(&self) -> Result<Vec<String>, GeminiError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let page = self.fetch_model_page(page_token.as_deref()).await?;
            names.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.can_generate_content())
                    .map(|m| m.name),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = names.len(), "listed generation models");
        Ok(names)
    }

    async fn fetch_model_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<ListModelsResponse, GeminiError> {
        let url = format!("{}/v1beta/models", self.base_url);

        let mut request = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", LIST_PAGE_SIZE)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_failure(status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(e.to_string()))
    }

    /// Run one single-turn generation and return the candidate text.
    pub async fn generate_content(&self, model: &str, parts: &[Part]) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            qualify_model_name(model)
        );

        let request_body = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts }],
        };

        info!(model, parts = parts.len(), "calling generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_failure(status, &error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(e.to_string()))?;

        if let Some(text) = extract_candidate_text(&parsed) {
            debug!(result = %truncate_for_log(&text, 60), "generation complete");
            return Ok(text);
        }

        if let Some(reason) = block_reason(&parsed) {
            return Err(GeminiError::Blocked {
                reason: reason.to_string(),
            });
        }

        Err(GeminiError::EmptyResponse {
            finish_reason: parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone()),
        })
    }
}

#[async_trait]
impl ModelCatalog for GeminiClient {
    async fn available_models(&self) -> Result<Vec<String>, GeminiError> {
        self.list_models().await
    }
}

/// The REST path wants `models/<name>`; bare names get the namespace added.
fn qualify_model_name(model: &str) -> String {
    if model.contains('/') {
        model.to_string()
    } else {
        format!("{}{}", MODEL_NAMESPACE_PREFIX, model)
    }
}

/// Turn a non-2xx response into a typed error.
fn classify_failure(status: StatusCode, body: &str) -> GeminiError {
    let envelope = serde_json::from_str::<ApiErrorEnvelope>(body).ok();

    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate_for_log(body, 120));

    let exhausted = envelope
        .as_ref()
        .is_some_and(|e| e.error.status == "RESOURCE_EXHAUSTED");

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        GeminiError::RateLimited { message }
    } else {
        GeminiError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
