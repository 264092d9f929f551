use actix_web::{delete, get, patch, put, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{ApiResponse, ChangePlanRequest, UpdateProfileRequest, UserResponse, VerifyResponse};
use crate::services::user_service::UserService;

/// GET /api/profile (PROTÉGÉE)
#[get("")]
pub async fn get_profile(
    auth_user: AuthUser,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.get_profile(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(UserResponse::from(user))))
}

/// PATCH /api/profile - nom, avatar (PROTÉGÉE)
#[patch("")]
pub async fn update_profile(
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.update_profile(auth_user.id(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(UserResponse::from(user))))
}

/// DELETE /api/profile - supprime le compte et son historique (PROTÉGÉE)
#[delete("")]
pub async fn delete_profile(
    auth_user: AuthUser,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    users.delete_account(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Account deleted")))
}

/// GET /api/profile/stats (PROTÉGÉE)
#[get("/stats")]
pub async fn profile_stats(
    auth_user: AuthUser,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let stats = users.stats(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(stats)))
}

/// GET /api/profile/credits (PROTÉGÉE)
#[get("/credits")]
pub async fn profile_credits(
    auth_user: AuthUser,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let credits = users.credits(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(credits)))
}

/// PUT /api/profile/plan (PROTÉGÉE)
#[put("/plan")]
pub async fn change_plan(
    auth_user: AuthUser,
    body: web::Json<ChangePlanRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.change_plan(auth_user.id(), body.plan).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(UserResponse::from(user), "Plan updated")))
}

/// GET /api/profile/verify - le token est-il valide ? (PROTÉGÉE)
#[get("/verify")]
pub async fn verify(auth_user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(VerifyResponse {
        valid: true,
        user_id: auth_user.user.id,
        email: auth_user.user.email,
        plan: auth_user.user.plan,
    }))
}

pub fn profile_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/profile")
            .service(get_profile)
            .service(update_profile)
            .service(delete_profile)
            .service(profile_stats)
            .service(profile_credits)
            .service(change_plan)
            .service(verify),
    );
}
