use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::users;
use crate::services::auth_service::AuthService;

/// Utilisateur authentifié (JWT local ou jeton du fournisseur d'identité)
/// Utilisé comme extracteur dans les routes protégées
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: users::Model,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

/// Implémentation de FromRequest pour AuthUser
/// La vérification est asynchrone (BD + éventuel appel au fournisseur)
impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let auth_service = req.app_data::<web::Data<AuthService>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let auth_service = auth_service
                .ok_or_else(|| AppError::Internal("AuthService is not registered".to_string()))?;

            let token = token.ok_or_else(|| {
                AppError::Auth("Missing or invalid Authorization header (expected: Bearer <token>)".to_string())
            })?;

            let user = auth_service.authenticate(&token).await?;
            Ok(AuthUser { user })
        })
    }
}

/// Extrait le token du header "Authorization: Bearer <token>"
fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
