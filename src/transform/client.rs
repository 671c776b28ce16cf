//! HTTP client for the transform proxy.
//!
//! Request: `POST {endpoint}` with `{"type", "text", "langModel"?}`.
//! Success bodies are normalized from several provider shapes into plain text.
//! A model that is still loading gets exactly one retry after a fixed delay.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::languages;
use crate::config::TransformConfig;
use crate::error::{ReadEasyError, Result};

const TRUNCATION_MARKER: &str = "...";

/// Keys that carry the produced text, in lookup order.
const RESULT_KEYS: &[&str] = &["result", "generated_text", "summary_text", "translation_text"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Summarize,
    Simplify,
    Translate,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Simplify => "simplify",
            Self::Translate => "translate",
        }
    }

    /// Past tense for status messages ("Text summarized").
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Summarize => "summarized",
            Self::Simplify => "simplified",
            Self::Translate => "translated",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = ReadEasyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summarize" => Ok(Self::Summarize),
            "simplify" => Ok(Self::Simplify),
            "translate" => Ok(Self::Translate),
            other => Err(ReadEasyError::InputInvalid(format!("unknown transform '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub kind: TransformKind,
    pub text: String,
    /// Required for `Translate`, ignored otherwise
    pub target_language: Option<String>,
}

impl TransformRequest {
    pub fn new(kind: TransformKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            target_language: None,
        }
    }

    pub fn translate(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            kind: TransformKind::Translate,
            text: text.into(),
            target_language: Some(target_language.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub text: String,
    /// Input was cut before sending
    pub truncated: bool,
}

#[derive(Serialize)]
struct ProxyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
    #[serde(rename = "langModel", skip_serializing_if = "Option::is_none")]
    lang_model: Option<&'a str>,
}

pub struct TextTransformClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    max_chars: usize,
    max_translate_chars: usize,
    loading_retry_delay: Duration,
}

impl TextTransformClient {
    pub fn new(config: &TransformConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ReadEasyError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_chars: config.max_chars,
            max_translate_chars: config.max_translate_chars,
            loading_retry_delay: Duration::from_millis(config.loading_retry_delay_ms),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn limit_for(&self, kind: TransformKind) -> usize {
        match kind {
            TransformKind::Translate => self.max_translate_chars,
            _ => self.max_chars,
        }
    }

    /// Run one transform.
    pub async fn transform(&self, request: &TransformRequest) -> Result<TransformResult> {
        if request.text.trim().is_empty() {
            return Err(ReadEasyError::InputInvalid("no text to transform".into()));
        }

        let lang_model = match request.kind {
            TransformKind::Translate => {
                let target = request
                    .target_language
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        ReadEasyError::InputInvalid("translation needs a target language".into())
                    })?;
                let language = languages::lookup(target).ok_or_else(|| {
                    ReadEasyError::InputInvalid(format!("unsupported translation language '{target}'"))
                })?;
                Some(language.model)
            }
            _ => None,
        };

        let limit = self.limit_for(request.kind);
        let (text, truncated) = truncate(&request.text, limit);
        if truncated {
            info!(
                "Text too long ({} chars), truncated to {limit} chars for {}",
                request.text.chars().count(),
                request.kind
            );
        }

        let body = ProxyRequest {
            kind: request.kind.as_str(),
            text: &text,
            lang_model,
        };

        let t_start = Instant::now();
        let result = match self.attempt(&body).await {
            Err(ReadEasyError::UpstreamLoading) => {
                info!(
                    "Model loading, retrying once in {}ms",
                    self.loading_retry_delay.as_millis()
                );
                tokio::time::sleep(self.loading_retry_delay).await;
                self.attempt(&body).await
            }
            other => other,
        };

        match &result {
            Ok(output) => info!(
                "Transform {} done: {} chars → {} chars ({}ms)",
                request.kind,
                text.chars().count(),
                output.chars().count(),
                t_start.elapsed().as_millis()
            ),
            Err(e) => warn!("Transform {} failed: {e}", request.kind),
        }

        result.map(|text| TransformResult { text, truncated })
    }

    /// One request, bounded by the client timeout. The request future is
    /// dropped when the timeout fires.
    async fn attempt(&self, body: &ProxyRequest<'_>) -> Result<String> {
        let exchange = async {
            let response = self
                .client
                .post(&self.endpoint)
                .json(body)
                .send()
                .await
                .map_err(|e| ReadEasyError::Upstream {
                    status: 0,
                    message: "proxy unreachable".into(),
                    detail: Some(e.to_string()),
                })?;
            let status = response.status().as_u16();
            let raw = response.text().await.map_err(|e| ReadEasyError::Upstream {
                status,
                message: "failed to read response".into(),
                detail: Some(e.to_string()),
            })?;
            Ok::<_, ReadEasyError>((status, raw))
        };

        let (status, raw) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Transform request timed out after {}ms", self.timeout.as_millis());
                return Err(ReadEasyError::UpstreamTimeout(self.timeout.as_millis() as u64));
            }
        };
        debug!("Proxy responded {status} ({} bytes)", raw.len());
        interpret(status, &raw)
    }
}

/// Cut `text` to `limit` chars, appending `...` when cut.
pub fn truncate(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => (format!("{}{TRUNCATION_MARKER}", &text[..byte]), true),
        None => (text.to_string(), false),
    }
}

/// Extract the produced text from any of the known response shapes:
/// `{"result": ...}`, `[{"generated_text": ...}]`, `{"summary_text": ...}`,
/// `{"translation_text": ...}`, or a bare string.
pub fn normalize_response(value: &Value) -> Option<String> {
    let candidate = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };

    if let Value::String(text) = candidate {
        let text = text.trim();
        return (!text.is_empty()).then(|| text.to_string());
    }

    RESULT_KEYS
        .iter()
        .filter_map(|key| candidate.get(key))
        .find_map(normalize_response)
}

/// Map status + raw body to produced text or a typed error.
fn interpret(status: u16, raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);

    if is_loading(&value) {
        return Err(ReadEasyError::UpstreamLoading);
    }

    if !(200..300).contains(&status) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        let detail = match value.get("details") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None if value.is_null() && !raw.trim().is_empty() => {
                Some(raw.trim().to_string())
            }
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        return Err(ReadEasyError::Upstream {
            status,
            message,
            detail,
        });
    }

    normalize_response(&value).ok_or_else(|| ReadEasyError::Upstream {
        status,
        message: "empty response from model".into(),
        detail: (!raw.trim().is_empty()).then(|| raw.trim().to_string()),
    })
}

/// The model is still warming up. A bare 503 is an ordinary outage; the body
/// has to say so.
fn is_loading(value: &Value) -> bool {
    if value.get("loading").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    value
        .get("error")
        .and_then(Value::as_str)
        .is_some_and(|e| e.to_lowercase().contains("loading"))
}
