// ============================================================================
// SERVICE RÉSUMÉS - génération facturée + gestion de l'historique
// ============================================================================
//
// Génération (generate):
//   1. Validation de la requête
//   2. Chargement de l'utilisateur (absent → NotFound)
//   3. Solde < coût → InsufficientCredits, rien n'est écrit
//   4. Résumé COMPLETED existant pour (user, vidéo) → renvoyé tel quel,
//      aucun débit (from_cache = true)
//   5. UNE transaction: insertion de la ligne PROCESSING + débit conditionnel
//   6. Appel LLM
//        - succès → PROCESSING → COMPLETED (UPDATE conditionnel)
//            · violation de l'index unique partiel (requête concurrente déjà
//              terminée) → suppression de la ligne provisoire + remboursement
//              dans une transaction, le gagnant est renvoyé en cache
//        - échec  → UNE transaction: PROCESSING → FAILED + remboursement,
//          puis l'erreur LLM d'origine est renvoyée
//   7. Rétention de l'historique (best-effort)
//
// Points d'attention:
//   - credits_charged mémorise le montant débité pour CETTE ligne
//   - Une ligne restée PROCESSING (crash entre 5 et 6) est récupérée par
//     MaintenanceService::recover_stale_generations
//
// ============================================================================

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::*;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::models::dto::{
    GenerateSummaryRequest, ListSummariesQuery, Pagination, SaveSummaryRequest, SummaryStatsResponse,
    TranscriptSegment, UpdateSummaryRequest, VideoMetadata,
};
use crate::models::summaries::{self, SummaryStatus};
use crate::models::users;
use crate::services::credit_service::CreditService;
use crate::services::maintenance::MaintenanceService;
use crate::services::summarizer::{flatten_transcript, GeneratedSummary, Summarizer};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 50;

/// Résultat d'une génération
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub summary: summaries::Model,
    pub from_cache: bool,
    pub credits_remaining: i32,
}

#[derive(Clone)]
pub struct SummaryService {
    db: DatabaseConnection,
    summarizer: Summarizer,
    cost_per_summary: i32,
    history_cap: u64,
}

impl SummaryService {
    pub fn new(db: DatabaseConnection, summarizer: Summarizer, config: &Config) -> Self {
        Self {
            db,
            summarizer,
            cost_per_summary: config.credits.cost_per_summary,
            history_cap: config.history_cap,
        }
    }

    pub async fn generate(&self, user_id: Uuid, request: GenerateSummaryRequest) -> Result<GenerateOutcome, AppError> {
        // 1. Validation
        request.validate()?;
        let video_id = request.video.video_id.clone();

        // 2. Utilisateur
        let user = users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        // 3. Solde, avant toute écriture
        if user.credits < self.cost_per_summary {
            return Err(AppError::InsufficientCredits {
                available: user.credits,
                required: self.cost_per_summary,
            });
        }

        // 4. Idempotence par vidéo
        if let Some(existing) = self.find_completed(user_id, &video_id).await? {
            tracing::info!(%user_id, %video_id, summary_id = %existing.id, "Returning cached summary");
            return Ok(GenerateOutcome {
                summary: existing,
                from_cache: true,
                credits_remaining: user.credits,
            });
        }

        // 5. Ligne PROCESSING + débit, ensemble ou rien
        let summary_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        new_summary_row(
            summary_id,
            user_id,
            &request.video,
            &request.transcript,
            SummaryStatus::Processing,
            self.cost_per_summary,
        )
        .insert(&txn)
        .await?;

        let credits_remaining = match CreditService::deduct_credits(&txn, user_id, self.cost_per_summary).await {
            Ok(balance) => balance,
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };
        txn.commit().await?;

        tracing::info!(%user_id, %video_id, %summary_id, charged = self.cost_per_summary, "Summary generation started");

        // 6. Appel LLM
        match self.summarizer.summarize(&request.transcript, &request.video).await {
            Ok(generated) => {
                let outcome = self
                    .complete(user_id, summary_id, &video_id, generated, credits_remaining)
                    .await?;

                // 7. Rétention
                if !outcome.from_cache {
                    if let Err(e) = MaintenanceService::enforce_retention(&self.db, user_id, self.history_cap).await {
                        tracing::warn!(%user_id, error = %e, "History retention failed");
                    }
                }

                Ok(outcome)
            }
            Err(ai_error) => {
                match self.compensate(user_id, summary_id).await {
                    Ok(()) => tracing::warn!(
                        %user_id, %video_id, %summary_id, error = %ai_error,
                        "Summary generation failed, credits refunded"
                    ),
                    Err(e) => tracing::error!(
                        %user_id, %video_id, %summary_id, error = %e,
                        "Compensation failed, row left PROCESSING for recovery"
                    ),
                }
                Err(AppError::AiService(ai_error))
            }
        }
    }

    /// PROCESSING → COMPLETED, ou résolution du doublon concurrent
    async fn complete(
        &self,
        user_id: Uuid,
        summary_id: Uuid,
        video_id: &str,
        generated: GeneratedSummary,
        credits_remaining: i32,
    ) -> Result<GenerateOutcome, AppError> {
        let result = summaries::Entity::update_many()
            .col_expr(summaries::Column::KeyPoints, Expr::value(json!(generated.key_points)))
            .col_expr(summaries::Column::FullSummary, Expr::value(generated.full_summary))
            .col_expr(summaries::Column::Tags, Expr::value(json!(generated.tags)))
            .col_expr(summaries::Column::Status, Expr::value(SummaryStatus::Completed))
            .col_expr(summaries::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(summaries::Column::Id.eq(summary_id))
            .filter(summaries::Column::Status.eq(SummaryStatus::Processing))
            .exec(&self.db)
            .await;

        match result {
            Ok(updated) if updated.rows_affected == 1 => {
                let summary = summaries::Entity::find_by_id(summary_id)
                    .one(&self.db)
                    .await?
                    .ok_or_else(|| AppError::Internal("Completed summary disappeared".to_string()))?;

                tracing::info!(%user_id, %video_id, %summary_id, "Summary generation completed");
                Ok(GenerateOutcome {
                    summary,
                    from_cache: false,
                    credits_remaining,
                })
            }
            Ok(_) => {
                // Ligne reprise par la récupération des générations bloquées
                // (déjà passée FAILED et remboursée)
                Err(AppError::Internal(format!(
                    "Summary {} is no longer processing",
                    summary_id
                )))
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                self.resolve_duplicate(user_id, summary_id, video_id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Une requête concurrente a terminé la même vidéo: la ligne provisoire
    /// est supprimée et remboursée, le résumé gagnant est renvoyé
    async fn resolve_duplicate(
        &self,
        user_id: Uuid,
        summary_id: Uuid,
        video_id: &str,
    ) -> Result<GenerateOutcome, AppError> {
        let txn = self.db.begin().await?;

        let charged = charged_amount(&txn, summary_id).await?;
        let deleted = summaries::Entity::delete_many()
            .filter(summaries::Column::Id.eq(summary_id))
            .filter(summaries::Column::Status.eq(SummaryStatus::Processing))
            .exec(&txn)
            .await?;

        let credits_remaining = if deleted.rows_affected == 1 && charged > 0 {
            CreditService::add_credits(&txn, user_id, charged).await?
        } else {
            CreditService::balance(&txn, user_id).await?
        };
        txn.commit().await?;

        let winner = self
            .find_completed(user_id, video_id)
            .await?
            .ok_or_else(|| AppError::Internal("Concurrent summary not found".to_string()))?;

        tracing::info!(
            %user_id, %video_id, %summary_id, winner = %winner.id,
            "Concurrent generation already completed, provisional summary refunded"
        );

        Ok(GenerateOutcome {
            summary: winner,
            from_cache: true,
            credits_remaining,
        })
    }

    /// PROCESSING → FAILED + remboursement de credits_charged, dans une seule transaction
    async fn compensate(&self, user_id: Uuid, summary_id: Uuid) -> Result<(), AppError> {
        let txn = self.db.begin().await?;

        let charged = charged_amount(&txn, summary_id).await?;
        let flipped = mark_failed(&txn, summary_id).await?;
        if flipped && charged > 0 {
            CreditService::add_credits(&txn, user_id, charged).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Enregistrement direct d'un résumé déjà produit (pas de LLM, pas de crédit)
    pub async fn save(&self, user_id: Uuid, request: SaveSummaryRequest) -> Result<summaries::Model, AppError> {
        request.validate()?;

        if self.find_completed(user_id, &request.video.video_id).await?.is_some() {
            return Err(AppError::Conflict(
                "A summary already exists for this video".to_string(),
            ));
        }

        let mut summary = new_summary_row(
            Uuid::new_v4(),
            user_id,
            &request.video,
            &request.transcript,
            SummaryStatus::Completed,
            0,
        );
        if let Some(title) = request.title {
            summary.title = Set(title);
        }
        summary.key_points = Set(json!(request.key_points));
        summary.full_summary = Set(request.full_summary);
        summary.tags = Set(json!(request.tags));

        let saved = summary.insert(&self.db).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AppError::Conflict("A summary already exists for this video".to_string())
            } else {
                AppError::from(e)
            }
        })?;

        tracing::info!(%user_id, video_id = %saved.video_id, summary_id = %saved.id, "Summary saved");

        if let Err(e) = MaintenanceService::enforce_retention(&self.db, user_id, self.history_cap).await {
            tracing::warn!(%user_id, error = %e, "History retention failed");
        }

        Ok(saved)
    }

    /// Historique paginé, du plus récent au plus ancien
    pub async fn list(
        &self,
        user_id: Uuid,
        query: ListSummariesQuery,
    ) -> Result<(Vec<summaries::Model>, Pagination), AppError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let mut select = summaries::Entity::find().filter(summaries::Column::UserId.eq(user_id));

        if let Some(status) = query.status {
            select = select.filter(summaries::Column::Status.eq(status));
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            select = select.filter(Expr::expr(Func::lower(Expr::col(summaries::Column::Title))).like(pattern));
        }

        let paginator = select
            .order_by_desc(summaries::Column::CreatedAt)
            .order_by_desc(summaries::Column::Id)
            .paginate(&self.db, limit);

        let totals = paginator.num_items_and_pages().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok((
            items,
            Pagination {
                page,
                limit,
                total: totals.number_of_items,
                total_pages: totals.number_of_pages,
            },
        ))
    }

    pub async fn get(&self, user_id: Uuid, summary_id: Uuid) -> Result<summaries::Model, AppError> {
        summaries::Entity::find_by_id(summary_id)
            .filter(summaries::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Summary not found".to_string()))
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        summary_id: Uuid,
        request: UpdateSummaryRequest,
    ) -> Result<summaries::Model, AppError> {
        request.validate()?;

        let summary = self.get(user_id, summary_id).await?;
        let mut active: summaries::ActiveModel = summary.into();

        if let Some(title) = request.title {
            active.title = Set(title);
        }
        if let Some(key_points) = request.key_points {
            active.key_points = Set(json!(key_points));
        }
        if let Some(full_summary) = request.full_summary {
            active.full_summary = Set(full_summary);
        }
        if let Some(tags) = request.tags {
            active.tags = Set(json!(tags));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&self.db).await?)
    }

    pub async fn delete(&self, user_id: Uuid, summary_id: Uuid) -> Result<(), AppError> {
        let result = summaries::Entity::delete_many()
            .filter(summaries::Column::Id.eq(summary_id))
            .filter(summaries::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound("Summary not found".to_string()));
        }

        tracing::info!(%user_id, %summary_id, "Summary deleted");
        Ok(())
    }

    /// Dernier résumé COMPLETED pour une vidéo
    pub async fn by_video(&self, user_id: Uuid, video_id: &str) -> Result<summaries::Model, AppError> {
        self.find_completed(user_id, video_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No summary for this video".to_string()))
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<SummaryStatsResponse, AppError> {
        summary_stats(&self.db, user_id).await
    }

    async fn find_completed(&self, user_id: Uuid, video_id: &str) -> Result<Option<summaries::Model>, DbErr> {
        summaries::Entity::find()
            .filter(summaries::Column::UserId.eq(user_id))
            .filter(summaries::Column::VideoId.eq(video_id))
            .filter(summaries::Column::Status.eq(SummaryStatus::Completed))
            .order_by_desc(summaries::Column::CreatedAt)
            .one(&self.db)
            .await
    }
}

/// Compteurs par statut et crédits consommés d'un utilisateur
pub async fn summary_stats<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<SummaryStatsResponse, AppError> {
    let per_status: Vec<(SummaryStatus, i64)> = summaries::Entity::find()
        .select_only()
        .column(summaries::Column::Status)
        .column_as(Expr::col(summaries::Column::Id).count(), "count")
        .filter(summaries::Column::UserId.eq(user_id))
        .group_by(summaries::Column::Status)
        .into_tuple()
        .all(db)
        .await?;

    // Crédits effectivement consommés: les lignes FAILED ont été remboursées
    let spent: Option<Option<i64>> = summaries::Entity::find()
        .select_only()
        .column_as(Expr::col(summaries::Column::CreditsCharged).sum(), "spent")
        .filter(summaries::Column::UserId.eq(user_id))
        .filter(summaries::Column::Status.ne(SummaryStatus::Failed))
        .into_tuple()
        .one(db)
        .await?;

    let mut stats = SummaryStatsResponse {
        total: 0,
        completed: 0,
        processing: 0,
        failed: 0,
        credits_spent: spent.flatten().unwrap_or(0),
    };

    for (status, count) in per_status {
        let count = count.max(0) as u64;
        stats.total += count;
        match status {
            SummaryStatus::Completed => stats.completed = count,
            SummaryStatus::Processing => stats.processing = count,
            SummaryStatus::Failed => stats.failed = count,
            SummaryStatus::Pending => {}
        }
    }

    Ok(stats)
}

/// PROCESSING → FAILED (conditionnel). true si la ligne a été basculée.
pub async fn mark_failed<C: ConnectionTrait>(db: &C, summary_id: Uuid) -> Result<bool, DbErr> {
    let result = summaries::Entity::update_many()
        .col_expr(summaries::Column::Status, Expr::value(SummaryStatus::Failed))
        .col_expr(summaries::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(summaries::Column::Id.eq(summary_id))
        .filter(summaries::Column::Status.eq(SummaryStatus::Processing))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Montant débité pour une ligne (0 si elle n'existe plus)
async fn charged_amount<C: ConnectionTrait>(db: &C, summary_id: Uuid) -> Result<i32, DbErr> {
    let charged = summaries::Entity::find_by_id(summary_id)
        .one(db)
        .await?
        .map(|summary| summary.credits_charged)
        .unwrap_or(0);
    Ok(charged)
}

fn new_summary_row(
    id: Uuid,
    user_id: Uuid,
    video: &VideoMetadata,
    transcript: &[TranscriptSegment],
    status: SummaryStatus,
    credits_charged: i32,
) -> summaries::ActiveModel {
    let now = Utc::now();
    summaries::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        title: Set(video.title.clone()),
        key_points: Set(json!([])),
        full_summary: Set(String::new()),
        tags: Set(json!([])),
        status: Set(status),
        credits_charged: Set(credits_charged),
        video_id: Set(video.video_id.clone()),
        video_title: Set(video.title.clone()),
        video_channel: Set(video.channel_name.clone()),
        video_duration: Set(video.duration.clone()),
        video_url: Set(video.url.clone()),
        video_thumbnail: Set(video.thumbnail.clone()),
        transcript: Set(json!(transcript)),
        transcript_text: Set(flatten_transcript(transcript)),
        created_at: Set(now),
        updated_at: Set(now),
    }
}
