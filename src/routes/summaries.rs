use actix_web::{delete, get, patch, post, web, HttpResponse};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    ApiResponse, GenerateResponse, GenerateSummaryRequest, ListSummariesQuery, PaginatedResponse,
    SaveSummaryRequest, SummaryResponse, UpdateSummaryRequest,
};
use crate::services::summary_service::SummaryService;

/// POST /api/summaries/generate - Génération facturée (PROTÉGÉE)
///
/// La génération tourne dans une tâche séparée: si le délai de la requête
/// expire, le client reçoit 504 mais la génération va à son terme
/// (succès, ou échec + remboursement).
#[post("/generate")]
pub async fn generate(
    auth_user: AuthUser,
    body: web::Json<GenerateSummaryRequest>,
    summaries: web::Data<SummaryService>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let service = summaries.get_ref().clone();
    let user_id = auth_user.id();
    let request = body.into_inner();

    let task = actix_web::rt::spawn(async move { service.generate(user_id, request).await });

    let outcome = match tokio::time::timeout(config.request_timeout, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(AppError::Internal(format!("Generation task failed: {}", e))),
        Err(_) => {
            tracing::warn!(%user_id, "Generation exceeded request deadline, continuing in background");
            return Err(AppError::Timeout);
        }
    };

    let from_cache = outcome.from_cache;
    let response = ApiResponse::ok(GenerateResponse {
        summary: SummaryResponse::from_model(outcome.summary),
        from_cache,
        credits_remaining: outcome.credits_remaining,
    });

    Ok(if from_cache {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::Created().json(response)
    })
}

/// POST /api/summaries - Enregistre un résumé déjà produit (PROTÉGÉE)
#[post("")]
pub async fn save_summary(
    auth_user: AuthUser,
    body: web::Json<SaveSummaryRequest>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let saved = summaries.save(auth_user.id(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(SummaryResponse::from_model(saved))))
}

/// GET /api/summaries?page=&limit=&status=&search= (PROTÉGÉE)
#[get("")]
pub async fn list_summaries(
    auth_user: AuthUser,
    query: web::Query<ListSummariesQuery>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let (items, pagination) = summaries.list(auth_user.id(), query.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(PaginatedResponse {
        items: items.into_iter().map(SummaryResponse::from_model).collect(),
        pagination,
    })))
}

/// GET /api/summaries/stats (PROTÉGÉE)
#[get("/stats")]
pub async fn summary_stats(
    auth_user: AuthUser,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let stats = summaries.stats(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(stats)))
}

/// GET /api/summaries/video/{video_id} (PROTÉGÉE)
#[get("/video/{video_id}")]
pub async fn summary_by_video(
    auth_user: AuthUser,
    path: web::Path<String>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let summary = summaries.by_video(auth_user.id(), &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(SummaryResponse::with_transcript(summary))))
}

/// GET /api/summaries/{id} (PROTÉGÉE)
#[get("/{id}")]
pub async fn get_summary(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let summary = summaries.get(auth_user.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(SummaryResponse::with_transcript(summary))))
}

/// PATCH /api/summaries/{id} (PROTÉGÉE)
#[patch("/{id}")]
pub async fn update_summary(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateSummaryRequest>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    let summary = summaries
        .update(auth_user.id(), path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(SummaryResponse::from_model(summary))))
}

/// DELETE /api/summaries/{id} (PROTÉGÉE)
#[delete("/{id}")]
pub async fn delete_summary(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    summaries: web::Data<SummaryService>,
) -> Result<HttpResponse, AppError> {
    summaries.delete(auth_user.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Summary deleted")))
}

pub fn summaries_routes(cfg: &mut web::ServiceConfig) {
    // Routes fixes avant /{id}
    cfg.service(
        web::scope("/summaries")
            .service(generate)
            .service(save_summary)
            .service(list_summaries)
            .service(summary_stats)
            .service(summary_by_video)
            .service(get_summary)
            .service(update_summary)
            .service(delete_summary),
    );
}
