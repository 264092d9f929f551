use chrono::{DateTime, Datelike, TimeZone, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::config::CreditSettings;
use crate::error::AppError;
use crate::models::users::{self, Plan};

/// Registre des crédits: un entier sur la ligne users, modifié uniquement
/// par des UPDATE atomiques (jamais de lecture puis écriture).
pub struct CreditService;

impl CreditService {
    /// Solde courant
    pub async fn balance<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<i32, AppError> {
        users::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .map(|u| u.credits)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Ajoute des crédits (remboursement, octroi manuel, changement de plan)
    /// Retourne le nouveau solde
    pub async fn add_credits<C: ConnectionTrait>(db: &C, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("Credit amount must be greater than 0".to_string()));
        }

        let result = users::Entity::update_many()
            .col_expr(users::Column::Credits, Expr::col(users::Column::Credits).add(amount))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::debug!(%user_id, amount, "Credits added");
        Self::balance(db, user_id).await
    }

    /// Débite des crédits avec un UPDATE conditionnel:
    ///   UPDATE users SET credits = credits - N WHERE id = ? AND credits >= N
    /// 0 ligne modifiée → utilisateur absent ou solde insuffisant.
    /// Retourne le nouveau solde
    pub async fn deduct_credits<C: ConnectionTrait>(db: &C, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("Credit amount must be greater than 0".to_string()));
        }

        let result = users::Entity::update_many()
            .col_expr(users::Column::Credits, Expr::col(users::Column::Credits).sub(amount))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::Credits.gte(amount))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            let available = Self::balance(db, user_id).await?;
            return Err(AppError::InsufficientCredits {
                available,
                required: amount,
            });
        }

        tracing::debug!(%user_id, amount, "Credits deducted");
        Self::balance(db, user_id).await
    }

    /// Allotement mensuel: remonte le solde à l'allotement du plan (sans
    /// jamais le baisser) pour les utilisateurs pas encore traités ce mois-ci.
    /// Idempotent dans un même mois. Retourne le nombre d'utilisateurs traités.
    pub async fn reset_monthly_credits(
        db: &DatabaseConnection,
        settings: &CreditSettings,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let month_start = start_of_month(now);
        let txn = db.begin().await?;
        let mut processed = 0;

        for plan in [Plan::Free, Plan::Premium] {
            let allotment = settings.allotment(plan);

            // 1. Top-up des soldes sous l'allotement
            users::Entity::update_many()
                .col_expr(users::Column::Credits, Expr::value(allotment))
                .filter(users::Column::Plan.eq(plan))
                .filter(users::Column::CreditsResetAt.lt(month_start))
                .filter(users::Column::Credits.lt(allotment))
                .exec(&txn)
                .await?;

            // 2. Marquer tous les utilisateurs du plan comme traités
            let result = users::Entity::update_many()
                .col_expr(users::Column::CreditsResetAt, Expr::value(now))
                .col_expr(users::Column::UpdatedAt, Expr::value(now))
                .filter(users::Column::Plan.eq(plan))
                .filter(users::Column::CreditsResetAt.lt(month_start))
                .exec(&txn)
                .await?;

            processed += result.rows_affected;
        }

        txn.commit().await?;

        if processed > 0 {
            tracing::info!(users = processed, "Monthly credit allotment applied");
        }
        Ok(processed)
    }
}

/// 1er du mois à 00:00 UTC
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}
