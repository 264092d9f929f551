// ============================================================================
// MAINTENANCE - tâches de fond périodiques
// ============================================================================
//
// Boucle toutes les MAINTENANCE_INTERVAL_SECS:
//   1. Suppression des refresh tokens expirés ou révoqués
//   2. Récupération des générations bloquées en PROCESSING (crash entre le
//      débit et la compensation): FAILED + remboursement, une transaction
//      par ligne
//   3. Rétention: au plus HISTORY_CAP résumés par utilisateur (les plus
//      récents sont conservés)
//   4. Allotement mensuel des crédits
//
// Chaque étape est indépendante: une erreur est loggée, les suivantes
// s'exécutent quand même.
//
// ============================================================================

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::refresh_tokens;
use crate::models::summaries::{self, SummaryStatus};
use crate::services::credit_service::CreditService;
use crate::services::summary_service::mark_failed;

pub struct MaintenanceService;

impl MaintenanceService {
    /// Supprime les refresh tokens expirés ou révoqués
    pub async fn cleanup_refresh_tokens(db: &DatabaseConnection) -> Result<u64, AppError> {
        let result = refresh_tokens::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(refresh_tokens::Column::Revoked.eq(true))
                    .add(refresh_tokens::Column::ExpiresAt.lte(Utc::now())),
            )
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Garde les `cap` résumés les plus récents d'un utilisateur.
    /// Les lignes PROCESSING (génération en cours) ne sont jamais supprimées.
    pub async fn enforce_retention<C: ConnectionTrait>(db: &C, user_id: Uuid, cap: u64) -> Result<u64, AppError> {
        let ordered: Vec<(Uuid, SummaryStatus)> = summaries::Entity::find()
            .select_only()
            .column(summaries::Column::Id)
            .column(summaries::Column::Status)
            .filter(summaries::Column::UserId.eq(user_id))
            .order_by_desc(summaries::Column::CreatedAt)
            .order_by_desc(summaries::Column::Id)
            .into_tuple()
            .all(db)
            .await?;

        let excess: Vec<Uuid> = ordered
            .into_iter()
            .skip(cap as usize)
            .filter(|(_, status)| *status != SummaryStatus::Processing)
            .map(|(id, _)| id)
            .collect();

        if excess.is_empty() {
            return Ok(0);
        }

        let result = summaries::Entity::delete_many()
            .filter(summaries::Column::Id.is_in(excess))
            .exec(db)
            .await?;

        tracing::info!(%user_id, deleted = result.rows_affected, cap, "History retention applied");
        Ok(result.rows_affected)
    }

    /// Rétention pour tous les utilisateurs au-dessus du plafond
    pub async fn enforce_retention_all(db: &DatabaseConnection, cap: u64) -> Result<u64, AppError> {
        let over_cap: Vec<Uuid> = summaries::Entity::find()
            .select_only()
            .column(summaries::Column::UserId)
            .group_by(summaries::Column::UserId)
            .having(Expr::expr(Expr::col(summaries::Column::Id).count()).gt(cap as i64))
            .into_tuple()
            .all(db)
            .await?;

        let mut deleted = 0;
        for user_id in over_cap {
            deleted += Self::enforce_retention(db, user_id, cap).await?;
        }
        Ok(deleted)
    }

    /// PROCESSING depuis plus de `older_than` → FAILED + remboursement
    pub async fn recover_stale_generations(
        db: &DatabaseConnection,
        older_than: chrono::Duration,
    ) -> Result<u64, AppError> {
        let cutoff = Utc::now() - older_than;

        let stale = summaries::Entity::find()
            .filter(summaries::Column::Status.eq(SummaryStatus::Processing))
            .filter(summaries::Column::CreatedAt.lt(cutoff))
            .all(db)
            .await?;

        let mut recovered = 0;
        for summary in stale {
            let txn = db.begin().await?;

            // Conditionnel: une génération qui vient de se terminer n'est pas touchée
            let flipped = mark_failed(&txn, summary.id).await?;
            if flipped && summary.credits_charged > 0 {
                CreditService::add_credits(&txn, summary.user_id, summary.credits_charged).await?;
            }
            txn.commit().await?;

            if flipped {
                recovered += 1;
                tracing::warn!(
                    user_id = %summary.user_id,
                    summary_id = %summary.id,
                    refunded = summary.credits_charged,
                    "Stale generation marked failed and refunded"
                );
            }
        }

        Ok(recovered)
    }

    /// Un passage complet
    pub async fn run_once(db: &DatabaseConnection, config: &Config) {
        match Self::cleanup_refresh_tokens(db).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(deleted = n, "Expired refresh tokens removed"),
            Err(e) => tracing::error!(error = %e, "Refresh token cleanup failed"),
        }

        if let Err(e) = Self::recover_stale_generations(db, config.stale_generation_after).await {
            tracing::error!(error = %e, "Stale generation recovery failed");
        }

        if let Err(e) = Self::enforce_retention_all(db, config.history_cap).await {
            tracing::error!(error = %e, "History retention failed");
        }

        if let Err(e) = CreditService::reset_monthly_credits(db, &config.credits, Utc::now()).await {
            tracing::error!(error = %e, "Monthly credit reset failed");
        }
    }

    /// Lance la boucle en tâche de fond
    pub fn spawn(db: DatabaseConnection, config: Config) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.maintenance_interval);
            loop {
                interval.tick().await;
                Self::run_once(&db, &config).await;
            }
        })
    }
}
