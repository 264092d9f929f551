// ============================================================================
// SERVICE D'AUTHENTIFICATION
// ============================================================================
//
// Deux sortes de bearer tokens sont acceptées (authenticate):
//   1. JWT local HS256 → utilisateur par id
//      (utilisateur supprimé → on passe à l'étape 2)
//   2. Jeton du fournisseur d'identité → utilisateur par external_id,
//      sinon liaison d'un compte existant par email (email confirmé,
//      compte non lié), sinon refus,
//      sinon création d'un compte FREE (provisioning au premier usage)
//   Les deux échouent → "Invalid or expired token", sans dire lequel.
//
// Refresh tokens:
//   - usage unique: révocation conditionnelle + émission du remplaçant dans
//     la même transaction
//   - seul le hash SHA-256 est stocké
//
// ============================================================================

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::models::dto::{LoginRequest, RegisterRequest, TokenResponse};
use crate::models::refresh_tokens;
use crate::models::users::{self, normalize_email, Plan};
use crate::services::identity_provider::{FederatedIdentity, IdentityError, IdentityProvider};
use crate::utils::{jwt, password, tokens};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AuthService {
    db: DatabaseConnection,
    identity: Arc<dyn IdentityProvider>,
    jwt_secret: String,
    access_token_ttl: chrono::Duration,
    refresh_token_ttl: chrono::Duration,
    signup_credits: i32,
}

impl AuthService {
    pub fn new(db: DatabaseConnection, identity: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Self {
            db,
            identity,
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            signup_credits: config.credits.allotment(Plan::Free),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<(users::Model, TokenResponse), AppError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        // 1. Email déjà utilisé
        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        // 2. Hash du mot de passe
        let plain = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        // 3. Création du compte
        let now = Utc::now();
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            password_hash: Set(Some(password_hash)),
            external_id: Set(None),
            name: Set(request.name),
            avatar_url: Set(None),
            plan: Set(Plan::Free),
            credits: Set(self.signup_credits),
            email_verified: Set(false),
            last_login_at: Set(Some(now)),
            credits_reset_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AppError::Conflict("Email already registered".to_string())
            } else {
                AppError::from(e)
            }
        })?;

        // 4. Compte miroir chez le fournisseur (best-effort)
        match self.identity.create_user(&email, &request.password).await {
            Ok(()) | Err(IdentityError::NotConfigured) => {}
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "Identity provider signup failed"),
        }

        let tokens = self.issue_tokens(&self.db, &user).await?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok((user, tokens))
    }

    pub async fn login(&self, request: LoginRequest) -> Result<(users::Model, TokenResponse), AppError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.to_string()))?;

        // Comptes uniquement fédérés: pas de mot de passe local
        let stored_hash = user
            .password_hash
            .clone()
            .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.to_string()))?;

        // PBKDF2 hors des workers actix
        let plain = request.password;
        let valid = tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
                AppError::Auth(INVALID_CREDENTIALS.to_string())
            })?;
        if !valid {
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        }

        let mut active: users::ActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now()));
        let user = active.update(&self.db).await?;

        let tokens = self.issue_tokens(&self.db, &user).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    /// Rotation: l'ancien token est révoqué et remplacé atomiquement
    pub async fn refresh(&self, raw_token: &str) -> Result<(users::Model, TokenResponse), AppError> {
        let token_hash = tokens::hash_token(raw_token);
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let stored = refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::TokenHash.eq(token_hash.as_str()))
            .one(&txn)
            .await?;
        let Some(stored) = stored else {
            txn.rollback().await?;
            return Err(AppError::unauthorized());
        };

        // Révocation conditionnelle: un seul appelant peut la gagner
        let revoked = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .filter(refresh_tokens::Column::Id.eq(stored.id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(now))
            .exec(&txn)
            .await?;
        if revoked.rows_affected != 1 {
            txn.rollback().await?;
            tracing::warn!(user_id = %stored.user_id, "Refresh token reused or expired");
            return Err(AppError::unauthorized());
        }

        let Some(user) = users::Entity::find_by_id(stored.user_id).one(&txn).await? else {
            txn.rollback().await?;
            return Err(AppError::unauthorized());
        };

        let tokens = self.issue_tokens(&txn, &user).await?;
        txn.commit().await?;

        Ok((user, tokens))
    }

    /// Révoque un refresh token du caller, ou tous s'il n'en donne pas
    pub async fn logout(&self, user_id: Uuid, raw_token: Option<&str>) -> Result<u64, AppError> {
        let mut update = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false));

        if let Some(raw) = raw_token {
            update = update.filter(refresh_tokens::Column::TokenHash.eq(tokens::hash_token(raw)));
        }

        let result = update.exec(&self.db).await?;
        tracing::info!(%user_id, revoked = result.rows_affected, "User logged out");
        Ok(result.rows_affected)
    }

    /// Toujours un succès côté client (pas d'énumération des comptes)
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        if let Err(e) = self.identity.send_password_reset(&email).await {
            tracing::warn!(error = %e, "Password reset request failed");
        }
        Ok(())
    }

    /// Résout un bearer token en utilisateur
    pub async fn authenticate(&self, token: &str) -> Result<users::Model, AppError> {
        // 1. JWT local
        if let Ok(claims) = jwt::verify_access_token(token, &self.jwt_secret) {
            if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
                if let Some(user) = users::Entity::find_by_id(user_id).one(&self.db).await? {
                    return Ok(user);
                }
                tracing::debug!(%user_id, "Valid local token for a missing user");
            }
        }

        // 2. Fournisseur d'identité
        match self.identity.verify_token(token).await {
            Ok(identity) => self.resolve_federated_user(identity).await,
            Err(IdentityError::Request(e)) => {
                tracing::warn!(error = %e, "Identity provider verification failed");
                Err(AppError::unauthorized())
            }
            Err(_) => Err(AppError::unauthorized()),
        }
    }

    async fn resolve_federated_user(&self, identity: FederatedIdentity) -> Result<users::Model, AppError> {
        // Déjà lié
        if let Some(user) = self.find_by_external_id(&identity.subject_id).await? {
            return Ok(user);
        }

        let email = normalize_email(&identity.email);

        // Compte local existant avec le même email: liaison seulement si le
        // fournisseur a confirmé l'email et que le compte n'est lié à personne
        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?;
        if let Some(user) = existing {
            if !identity.email_confirmed || user.external_id.is_some() {
                tracing::warn!(
                    user_id = %user.id,
                    email_confirmed = identity.email_confirmed,
                    already_linked = user.external_id.is_some(),
                    "Refused to link federated identity to existing user"
                );
                return Err(AppError::unauthorized());
            }

            let user_id = user.id;
            let mut active: users::ActiveModel = user.into();
            active.external_id = Set(Some(identity.subject_id));
            active.email_verified = Set(true);
            active.updated_at = Set(Utc::now());
            let user = active.update(&self.db).await?;
            tracing::info!(%user_id, "Linked federated identity to existing user");
            return Ok(user);
        }

        // Provisioning au premier usage
        let now = Utc::now();
        let inserted = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            password_hash: Set(None),
            external_id: Set(Some(identity.subject_id.clone())),
            name: Set(identity.name),
            avatar_url: Set(identity.avatar_url),
            plan: Set(Plan::Free),
            credits: Set(self.signup_credits),
            email_verified: Set(identity.email_confirmed),
            last_login_at: Set(Some(now)),
            credits_reset_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Provisioned user from federated identity");
                Ok(user)
            }
            // Deux premières requêtes simultanées: l'autre a gagné
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => self
                .find_by_external_id(&identity.subject_id)
                .await?
                .ok_or_else(AppError::unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_external_id(&self, subject_id: &str) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::ExternalId.eq(subject_id))
            .one(&self.db)
            .await
    }

    /// Access token + nouveau refresh token (stocké hashé)
    pub async fn issue_tokens<C: ConnectionTrait>(&self, conn: &C, user: &users::Model) -> Result<TokenResponse, AppError> {
        let access_token = jwt::generate_access_token(user.id, &user.email, &self.jwt_secret, self.access_token_ttl)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let refresh_token = tokens::generate_refresh_token();
        let now = Utc::now();

        refresh_tokens::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            token_hash: Set(tokens::hash_token(&refresh_token)),
            expires_at: Set(now + self.refresh_token_ttl),
            revoked: Set(false),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.access_token_ttl.num_seconds(),
        })
    }
}
