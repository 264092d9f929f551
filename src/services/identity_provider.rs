// ============================================================================
// FOURNISSEUR D'IDENTITÉ HÉBERGÉ (API GoTrue)
// ============================================================================
//
// Endpoints utilisés:
//   - GET  /auth/v1/user         → vérification d'un access token fédéré
//   - POST /auth/v1/admin/users  → création d'un compte (clé service requise)
//   - POST /auth/v1/recover      → email de réinitialisation du mot de passe
//
// Points d'attention:
//   - Optionnel: sans IDENTITY_URL, NoIdentityProvider refuse tous les jetons
//   - La création de compte est best-effort côté AuthService
//
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::IdentitySettings;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Profil renvoyé par le fournisseur pour un jeton valide
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedIdentity {
    pub subject_id: String,
    pub email: String,
    pub email_confirmed: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider rejected the token")]
    InvalidToken,

    #[error("Identity provider is not configured")]
    NotConfigured,

    #[error("Identity provider request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, IdentityError>;

    async fn create_user(&self, email: &str, password: &str) -> Result<(), IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;
}

/// Mode local uniquement
pub struct NoIdentityProvider;

#[async_trait]
impl IdentityProvider for NoIdentityProvider {
    async fn verify_token(&self, _token: &str) -> Result<FederatedIdentity, IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn create_user(&self, _email: &str, _password: &str) -> Result<(), IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), IdentityError> {
        Err(IdentityError::NotConfigured)
    }
}

pub struct HostedIdentityProvider {
    http_client: reqwest::Client,
    settings: IdentitySettings,
}

impl HostedIdentityProvider {
    pub fn new(settings: IdentitySettings) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Request(format!("failed building HTTP client: {}", e)))?;

        tracing::info!(url = %settings.url, "Initialized hosted identity provider");

        Ok(Self { http_client, settings })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.settings.url, path)
    }
}

#[derive(Deserialize)]
struct ProviderUser {
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: ProviderMetadata,
}

#[derive(Deserialize, Default)]
struct ProviderMetadata {
    full_name: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    picture: Option<String>,
}

impl ProviderUser {
    fn into_identity(self) -> Result<FederatedIdentity, IdentityError> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(IdentityError::InvalidToken)?;

        Ok(FederatedIdentity {
            subject_id: self.id,
            email,
            email_confirmed: self.email_confirmed_at.is_some(),
            name: self.user_metadata.full_name.or(self.user_metadata.name),
            avatar_url: self.user_metadata.avatar_url.or(self.user_metadata.picture),
        })
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, IdentityError> {
        let response = self
            .http_client
            .get(self.endpoint("user"))
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IdentityError::InvalidToken);
        }
        if !status.is_success() {
            return Err(IdentityError::Request(format!("upstream status {}", status)));
        }

        let user: ProviderUser = response
            .json()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        user.into_identity()
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<(), IdentityError> {
        let service_key = self
            .settings
            .service_key
            .as_deref()
            .ok_or(IdentityError::NotConfigured)?;

        let response = self
            .http_client
            .post(self.endpoint("admin/users"))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": false,
            }))
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::Request(format!("upstream status {}", response.status())));
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .http_client
            .post(self.endpoint("recover"))
            .header("apikey", &self.settings.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::Request(format!("upstream status {}", response.status())));
        }
        Ok(())
    }
}
