// ============================================================================
// CLIENT LLM (API compatible OpenAI)
// ============================================================================
//
// Description:
//   Un seul aller-retour prompt/réponse vers /chat/completions.
//   Le découpage des longues transcriptions et la validation du JSON renvoyé
//   sont dans summarizer.rs.
//
// Erreurs distinguées:
//   - 429 + "insufficient_quota"        → QuotaExceeded
//   - 429                               → RateLimited (Retry-After si fourni)
//   - 400/413 + "context_length"        → ContentTooLong
//   - réponse vide                      → EmptyResponse
//   - 5xx, timeout, réseau              → Unavailable
//
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AiSettings;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("AI quota exhausted")]
    QuotaExceeded,

    #[error("AI service rate limit reached")]
    RateLimited { retry_after: Option<u64> },

    #[error("Transcript is too long for the AI service")]
    ContentTooLong,

    #[error("AI service returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("AI service returned an empty response")]
    EmptyResponse,

    #[error("AI service unavailable: {0}")]
    Unavailable(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::QuotaExceeded | AiError::RateLimited { .. } | AiError::Unavailable(_)
        )
    }

    pub fn retry_after_secs(&self) -> u64 {
        match self {
            AiError::RateLimited { retry_after: Some(secs) } => *secs,
            AiError::RateLimited { retry_after: None } => 60,
            AiError::QuotaExceeded => 3600,
            _ => 30,
        }
    }
}

/// Un appel au modèle
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Demande une sortie JSON structurée
    pub json_output: bool,
}

/// Fournisseur de complétion (injecté, remplacé par un faux dans les tests)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat_complete(&self, request: ChatRequest) -> Result<String, AiError>;
}

pub struct OpenAiProvider {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AiError::Unavailable(format!("failed building HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn chat_complete(&self, request: ChatRequest) -> Result<String, AiError> {
        let body = CompletionBody {
            model: &self.model,
            messages: [
                Message { role: "system", content: &request.system },
                Message { role: "user", content: &request.user },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &text, retry_after));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

/// Traduit une réponse HTTP en erreur typée
pub fn classify_failure(status: u16, body: &str, retry_after: Option<u64>) -> AiError {
    match status {
        429 if body.contains("insufficient_quota") => AiError::QuotaExceeded,
        429 => AiError::RateLimited { retry_after },
        413 => AiError::ContentTooLong,
        400 if body.contains("context_length") || body.contains("maximum context") => {
            AiError::ContentTooLong
        }
        500..=599 => AiError::Unavailable(format!("upstream status {}", status)),
        _ => {
            let snippet: String = body.chars().take(200).collect();
            AiError::Unavailable(format!("upstream status {}: {}", status, snippet))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota_vs_rate_limit() {
        let quota = classify_failure(429, r#"{"error":{"code":"insufficient_quota"}}"#, None);
        assert_eq!(quota, AiError::QuotaExceeded);

        let limited = classify_failure(429, r#"{"error":{"code":"rate_limit_exceeded"}}"#, Some(7));
        assert_eq!(limited, AiError::RateLimited { retry_after: Some(7) });
        assert_eq!(limited.retry_after_secs(), 7);
    }

    #[test]
    fn test_classify_context_length() {
        let err = classify_failure(400, r#"{"error":{"code":"context_length_exceeded"}}"#, None);
        assert_eq!(err, AiError::ContentTooLong);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_server_errors_are_retryable() {
        let err = classify_failure(503, "", None);
        assert!(matches!(err, AiError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}
