// Outils partagés par les tests: base SQLite temporaire migrée, faux
// fournisseurs LLM / identité pilotés par script.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use sea_orm_migration::MigratorTrait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::migration::Migrator;
use crate::models::dto::{TranscriptSegment, VideoMetadata};
use crate::models::users::{self, Plan};
use crate::services::ai_client::{AiError, ChatProvider, ChatRequest};
use crate::services::identity_provider::{FederatedIdentity, IdentityError, IdentityProvider};

/// Base SQLite fichier (le TempDir doit rester vivant pendant le test)
pub async fn setup_db() -> (DatabaseConnection, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    (db, dir)
}

pub async fn create_user(db: &DatabaseConnection, email: &str, credits: i32) -> users::Model {
    create_user_with_plan(db, email, credits, Plan::Free).await
}

pub async fn create_user_with_plan(db: &DatabaseConnection, email: &str, credits: i32, plan: Plan) -> users::Model {
    let now = Utc::now();
    users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(None),
        external_id: Set(None),
        name: Set(None),
        avatar_url: Set(None),
        plan: Set(plan),
        credits: Set(credits),
        email_verified: Set(false),
        last_login_at: Set(None),
        credits_reset_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn sample_video(video_id: &str) -> VideoMetadata {
    VideoMetadata {
        video_id: video_id.to_string(),
        title: format!("Video {}", video_id),
        channel_name: "Test Channel".to_string(),
        duration: Some("10:00".to_string()),
        url: format!("https://www.youtube.com/watch?v={}", video_id),
        thumbnail: None,
    }
}

pub fn sample_transcript() -> Vec<TranscriptSegment> {
    vec![
        TranscriptSegment::new("0:00", "Welcome to the channel"),
        TranscriptSegment::new("0:05", "Today we talk about Rust"),
        TranscriptSegment::new("0:12", "Ownership makes memory safety practical"),
    ]
}

pub const VALID_SUMMARY_JSON: &str = r#"{
    "keyPoints": ["Rust is memory safe", "Ownership is central"],
    "fullSummary": "A short introduction to Rust ownership.",
    "tags": ["rust", "programming"]
}"#;

/// Faux LLM: renvoie les réponses dans l'ordre et enregistre les appels.
/// Script épuisé → Unavailable.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, AiError>>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn with_responses(responses: Vec<Result<String, AiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat_complete(&self, request: ChatRequest) -> Result<String, AiError> {
        self.calls.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Unavailable("script exhausted".to_string())))
    }
}

/// Faux fournisseur d'identité: un seul jeton accepté
#[derive(Default)]
pub struct FakeIdentityProvider {
    pub accepted: Option<(String, FederatedIdentity)>,
    pub created: Mutex<Vec<String>>,
    pub reset_requests: Mutex<Vec<String>>,
}

impl FakeIdentityProvider {
    pub fn accepting(token: &str, identity: FederatedIdentity) -> Self {
        Self {
            accepted: Some((token.to_string(), identity)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, IdentityError> {
        match &self.accepted {
            Some((accepted, identity)) if accepted == token => Ok(identity.clone()),
            _ => Err(IdentityError::InvalidToken),
        }
    }

    async fn create_user(&self, email: &str, _password: &str) -> Result<(), IdentityError> {
        self.created.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.reset_requests.lock().unwrap().push(email.to_string());
        Ok(())
    }
}
