use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    ApiResponse, AuthResponse, ForgotPasswordRequest, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, UserResponse,
};
use crate::services::auth_service::AuthService;

/// POST /api/auth/register - Créer un compte (PUBLIC)
#[post("/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let (user, tokens) = auth.register(body.into_inner()).await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(AuthResponse {
        user: user.into(),
        tokens,
    })))
}

/// POST /api/auth/login - Connexion email + mot de passe (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let (user, tokens) = auth.login(body.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(AuthResponse {
        user: user.into(),
        tokens,
    })))
}

/// POST /api/auth/refresh - Rotation du refresh token (PUBLIC)
#[post("/refresh")]
pub async fn refresh(
    body: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let (user, tokens) = auth.refresh(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(AuthResponse {
        user: user.into(),
        tokens,
    })))
}

/// POST /api/auth/logout - Révoque un refresh token, ou tous (PROTÉGÉE)
#[post("/logout")]
pub async fn logout(
    auth_user: AuthUser,
    body: Option<web::Json<LogoutRequest>>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    auth.logout(auth_user.id(), body.refresh_token.as_deref()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message("Logged out")))
}

/// POST /api/auth/forgot-password - Email de réinitialisation (PUBLIC)
/// Réponse identique que le compte existe ou non
#[post("/forgot-password")]
pub async fn forgot_password(
    body: web::Json<ForgotPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    auth.forgot_password(&body.email).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message(
        "If an account exists for this email, a reset link has been sent",
    )))
}

/// GET /api/auth/me - Utilisateur courant (PROTÉGÉE)
#[get("/me")]
pub async fn me(auth_user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(UserResponse::from(auth_user.user)))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(refresh)
            .service(logout)
            .service(forgot_password)
            .service(me),
    );
}
