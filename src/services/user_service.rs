// ============================================================================
// SERVICE PROFIL
// ============================================================================
//
// Description:
//   Lecture / mise à jour du profil, crédits, changement de plan et
//   suppression du compte.
//
// Points d'attention:
//   - FREE → PREMIUM: octroi unique de (allotement PREMIUM - allotement FREE)
//     dans la même transaction que l'écriture du plan
//   - PREMIUM → FREE: seul le plan change, le solde est conservé
//   - Même plan → Conflict
//   - Suppression: summaries et refresh_tokens partent en cascade
//
// ============================================================================

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;
use validator::Validate;

use crate::config::CreditSettings;
use crate::error::AppError;
use crate::models::dto::{CreditsResponse, ProfileStatsResponse, UpdateProfileRequest};
use crate::models::users::{self, Plan};
use crate::services::credit_service::CreditService;
use crate::services::summary_service::summary_stats;

#[derive(Clone)]
pub struct UserService {
    db: DatabaseConnection,
    credits: CreditSettings,
}

impl UserService {
    pub fn new(db: DatabaseConnection, credits: CreditSettings) -> Self {
        Self { db, credits }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<users::Model, AppError> {
        users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn update_profile(&self, user_id: Uuid, request: UpdateProfileRequest) -> Result<users::Model, AppError> {
        request.validate()?;

        let user = self.get_profile(user_id).await?;
        let mut active: users::ActiveModel = user.into();

        if let Some(name) = request.name {
            active.name = Set(Some(name));
        }
        if let Some(avatar_url) = request.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&self.db).await?)
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<ProfileStatsResponse, AppError> {
        let user = self.get_profile(user_id).await?;
        let summaries = summary_stats(&self.db, user_id).await?;

        Ok(ProfileStatsResponse {
            plan: user.plan,
            credits: user.credits,
            monthly_allotment: self.credits.allotment(user.plan),
            summaries,
            member_since: user.created_at,
        })
    }

    pub async fn credits(&self, user_id: Uuid) -> Result<CreditsResponse, AppError> {
        let user = self.get_profile(user_id).await?;

        Ok(CreditsResponse {
            credits: user.credits,
            plan: user.plan,
            monthly_allotment: self.credits.allotment(user.plan),
            cost_per_summary: self.credits.cost_per_summary,
            credits_reset_at: user.credits_reset_at,
        })
    }

    pub async fn change_plan(&self, user_id: Uuid, plan: Plan) -> Result<users::Model, AppError> {
        let txn = self.db.begin().await?;

        // 1. Écriture conditionnelle du plan: même plan → 0 ligne
        let result = users::Entity::update_many()
            .col_expr(users::Column::Plan, Expr::value(plan))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::Plan.ne(plan))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            let exists = users::Entity::find_by_id(user_id).one(&txn).await?.is_some();
            txn.rollback().await?;
            return Err(if exists {
                AppError::Conflict("User is already on this plan".to_string())
            } else {
                AppError::NotFound("User not found".to_string())
            });
        }

        // 2. Octroi unique à la montée en gamme
        if plan == Plan::Premium {
            let grant = self.credits.allotment(Plan::Premium) - self.credits.allotment(Plan::Free);
            if grant > 0 {
                CreditService::add_credits(&txn, user_id, grant).await?;
            }
        }

        let user = users::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        txn.commit().await?;

        tracing::info!(%user_id, plan = ?plan, credits = user.credits, "Plan changed");
        Ok(user)
    }

    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), AppError> {
        let result = users::Entity::delete_by_id(user_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(%user_id, "Account deleted");
        Ok(())
    }
}
