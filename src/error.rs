// ============================================================================
// ERREURS APPLICATIVES
// ============================================================================
//
// Chaque variante correspond à un code HTTP et à un code machine stable.
// Réponse: { "success": false, "error": "CODE", "message": "...", ... }
//
// Points d'attention:
//   - 4xx (attendues) → tracing::warn!, le reste → tracing::error!
//   - Le texte brut des erreurs BD n'est exposé que si EXPOSE_ERROR_DETAILS
//   - Erreurs réessayables → "retryable": true + header Retry-After
//
// ============================================================================

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::OnceLock;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::services::ai_client::AiError;

static EXPOSE_DETAILS: OnceLock<bool> = OnceLock::new();

/// À appeler une seule fois au démarrage
pub fn set_expose_details(expose: bool) {
    let _ = EXPOSE_DETAILS.set(expose);
}

fn expose_details() -> bool {
    EXPOSE_DETAILS.get().copied().unwrap_or(false)
}

/// Erreur de validation d'un champ (chemin complet, ex: "transcript[2].text")
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient credits: {available} available, {required} required")]
    InsufficientCredits { available: i32, required: i32 },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    AiService(#[from] AiError),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Auth(String),

    #[error("Request timed out, the summary will keep processing in the background")]
    Timeout,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized() -> Self {
        AppError::Auth("Invalid or expired token".to_string())
    }

    /// Code machine stable exposé au client
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::AiService(e) => match e {
                AiError::QuotaExceeded => "AI_QUOTA_EXCEEDED",
                AiError::RateLimited { .. } => "AI_RATE_LIMITED",
                AiError::ContentTooLong => "AI_CONTENT_TOO_LONG",
                AiError::InvalidResponse(_) | AiError::EmptyResponse => "AI_INVALID_RESPONSE",
                AiError::Unavailable(_) => "AI_UNAVAILABLE",
            },
            AppError::Conflict(_) => "CONFLICT",
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Timeout => "TIMEOUT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Délai conseillé avant un nouvel essai (secondes), None si non réessayable
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::AiService(e) if e.is_retryable() => Some(e.retry_after_secs()),
            AppError::Timeout => Some(30),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) if !expose_details() => {
                "An unexpected error occurred".to_string()
            }
            AppError::AiService(AiError::InvalidResponse(_)) if !expose_details() => {
                "The AI service returned an unusable response".to_string()
            }
            AppError::AiService(AiError::Unavailable(_)) if !expose_details() => {
                "The AI service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::InvalidInput(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AiService(e) => match e {
                AiError::QuotaExceeded | AiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                AiError::ContentTooLong => StatusCode::PAYLOAD_TOO_LARGE,
                AiError::InvalidResponse(_) | AiError::EmptyResponse => StatusCode::BAD_GATEWAY,
                AiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if status.is_client_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::error!(code = self.code(), error = ?self, "Request failed");
        }

        let retry_after = self.retry_after();
        let errors = match self {
            AppError::Validation(errors) => Some(errors.as_slice()),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            error: self.code(),
            message: self.public_message(),
            errors,
            retryable: retry_after.is_some(),
            retry_after,
        };

        let mut response = HttpResponse::build(status);
        if let Some(secs) = retry_after {
            response.insert_header(("Retry-After", secs.to_string()));
        }
        response.json(body)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten_validation_errors(None, &errors, &mut fields);
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(fields)
    }
}

/// Aplatit les erreurs imbriquées (struct / liste) en chemins lisibles
fn flatten_validation_errors(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(p) => format!("{}.{}", p, field),
            None => field.to_string(),
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .clone()
                        .unwrap_or_else(|| Cow::Owned(format!("Invalid value ({})", error.code)));
                    out.push(FieldError {
                        field: path.clone(),
                        message: message.into_owned(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                flatten_validation_errors(Some(&path), nested, out);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let item_path = format!("{}[{}]", path, index);
                    flatten_validation_errors(Some(&item_path), nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::{GenerateSummaryRequest, TranscriptSegment, VideoMetadata};
    use validator::Validate;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::InsufficientCredits { available: 0, required: 1 }.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::unauthorized().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::AiService(AiError::RateLimited { retry_after: Some(12) }).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_retryable_errors_advise_delay() {
        let err = AppError::AiService(AiError::RateLimited { retry_after: Some(12) });
        assert_eq!(err.retry_after(), Some(12));
        assert!(AppError::AiService(AiError::ContentTooLong).retry_after().is_none());
        assert!(AppError::NotFound("x".into()).retry_after().is_none());
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::Internal("connection string leaked".into());
        assert_eq!(err.public_message(), "An unexpected error occurred");
    }

    #[test]
    fn test_nested_validation_errors_are_flattened() {
        let request = GenerateSummaryRequest {
            transcript: vec![
                TranscriptSegment::new("0:00", "hello"),
                TranscriptSegment::new("0:05", ""),
            ],
            video: VideoMetadata {
                video_id: "abc".into(),
                title: "Title".into(),
                channel_name: "Channel".into(),
                duration: None,
                url: "not a url".into(),
                thumbnail: None,
            },
        };

        let err = AppError::from(request.validate().unwrap_err());
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };

        let paths: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(paths, vec!["transcript[1].text", "video.url"]);
    }
}
