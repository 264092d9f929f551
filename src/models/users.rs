// ============================================================================
// MODÈLE : USERS
// ============================================================================
//
// Colonnes de la table users:
//   - id (UUID, PRIMARY KEY)
//   - email (VARCHAR, UNIQUE, NOT NULL) - toujours en minuscules
//   - password_hash (VARCHAR, NULL) - NULL pour les comptes uniquement fédérés
//   - external_id (VARCHAR, UNIQUE, NULL) - sujet chez le fournisseur d'identité
//   - name / avatar_url (NULL)
//   - plan (VARCHAR) - 'FREE' | 'PREMIUM'
//   - credits (INTEGER, NOT NULL) - jamais négatif, garanti par les UPDATE
//     conditionnels de CreditService (pas de contrainte CHECK)
//   - email_verified (BOOLEAN)
//   - last_login_at (TIMESTAMPTZ, NULL)
//   - credits_reset_at (TIMESTAMPTZ) - dernier allotement mensuel appliqué
//   - created_at / updated_at (TIMESTAMPTZ)
//
// Points d'attention:
//   - ON DELETE CASCADE vers summaries et refresh_tokens
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    #[sea_orm(string_value = "FREE")]
    Free,
    #[sea_orm(string_value = "PREMIUM")]
    Premium,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Format: pbkdf2:sha256:iterations$salt$hash
    #[sea_orm(unique)]
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub plan: Plan,
    pub credits: i32,
    pub email_verified: bool,
    pub last_login_at: Option<DateTimeUtc>,
    pub credits_reset_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::summaries::Entity")]
    Summaries,

    #[sea_orm(has_many = "super::refresh_tokens::Entity")]
    RefreshTokens,
}

impl Related<super::summaries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Summaries.def()
    }
}

impl Related<super::refresh_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RefreshTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Normalise un email (les emails sont uniques sans tenir compte de la casse)
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
