// ============================================================================
// DTO - REQUÊTES / RÉPONSES DE L'API
// ============================================================================
//
// Enveloppe commune: { "success": bool, "data"?: ..., "message"?: ... }
// Les erreurs utilisent { "success": false, "error": CODE, "message": ... }
// (voir error.rs).
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::summaries::{self, SummaryStatus};
use crate::models::users::{self, Plan};

// ----------------------------------------------------------------------------
// Enveloppe
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

// ----------------------------------------------------------------------------
// Auth
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub plan: Plan,
    pub credits: i32,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserResponse {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar_url: user.avatar_url,
            plan: user.plan,
            credits: user.credits,
            email_verified: user.email_verified,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Durée de vie de l'access token, en secondes
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

// ----------------------------------------------------------------------------
// Résumés
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TranscriptSegment {
    #[validate(length(min = 1, message = "Segment timestamp is required"))]
    pub timestamp: String,
    #[validate(length(min = 1, message = "Segment text is required"))]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl TranscriptSegment {
    pub fn new(timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            text: text.into(),
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    #[validate(length(min = 1, max = 64, message = "Video id is required"))]
    pub video_id: String,
    #[validate(length(min = 1, max = 500, message = "Video title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 200, message = "Channel name is required"))]
    pub channel_name: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[validate(url(message = "Invalid video URL"))]
    pub url: String,
    #[serde(default)]
    #[validate(url(message = "Invalid thumbnail URL"))]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateSummaryRequest {
    #[validate(length(min = 1, message = "Transcript must not be empty"), nested)]
    pub transcript: Vec<TranscriptSegment>,
    #[validate(nested)]
    pub video: VideoMetadata,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummaryRequest {
    #[validate(nested)]
    pub video: VideoMetadata,
    #[serde(default)]
    #[validate(nested)]
    pub transcript: Vec<TranscriptSegment>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "At least one key point is required"))]
    pub key_points: Vec<String>,
    #[validate(length(min = 1, message = "Summary text is required"))]
    pub full_summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummaryRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "At least one key point is required"))]
    pub key_points: Option<Vec<String>>,
    #[validate(length(min = 1, message = "Summary text is required"))]
    pub full_summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSummariesQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<SummaryStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub id: Uuid,
    pub title: String,
    pub key_points: Vec<String>,
    pub full_summary: String,
    pub tags: Vec<String>,
    pub status: SummaryStatus,
    pub video: VideoMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptSegment>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SummaryResponse {
    /// Version liste (sans transcription)
    pub fn from_model(summary: summaries::Model) -> Self {
        Self::build(summary, false)
    }

    /// Version détail (avec la transcription structurée)
    pub fn with_transcript(summary: summaries::Model) -> Self {
        Self::build(summary, true)
    }

    fn build(summary: summaries::Model, include_transcript: bool) -> Self {
        let key_points = summary.key_points_list();
        let tags = summary.tags_list();
        let transcript = if include_transcript {
            serde_json::from_value(summary.transcript).ok()
        } else {
            None
        };

        Self {
            id: summary.id,
            title: summary.title,
            key_points,
            full_summary: summary.full_summary,
            tags,
            status: summary.status,
            video: VideoMetadata {
                video_id: summary.video_id,
                title: summary.video_title,
                channel_name: summary.video_channel,
                duration: summary.video_duration,
                url: summary.video_url,
                thumbnail: summary.video_thumbnail,
            },
            transcript,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub summary: SummaryResponse,
    /// true si un résumé COMPLETED existait déjà (aucun crédit débité)
    pub from_cache: bool,
    pub credits_remaining: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatsResponse {
    pub total: u64,
    pub completed: u64,
    pub processing: u64,
    pub failed: u64,
    pub credits_spent: i64,
}

// ----------------------------------------------------------------------------
// Profil
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub credits: i32,
    pub plan: Plan,
    pub monthly_allotment: i32,
    pub cost_per_summary: i32,
    pub credits_reset_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStatsResponse {
    pub plan: Plan,
    pub credits: i32,
    pub monthly_allotment: i32,
    pub summaries: SummaryStatsResponse,
    pub member_since: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub email: String,
    pub plan: Plan,
}
