// ============================================================================
// MODÈLE : REFRESH TOKENS
// ============================================================================
//
// Workflow:
//   1. Login / register / refresh → un token opaque est généré
//   2. Seul le SHA-256 (hex) du token est stocké dans token_hash
//   3. POST /api/auth/refresh → le token est révoqué (revoked = true) et
//      remplacé dans la MÊME transaction (rotation, usage unique)
//   4. Le job de maintenance supprime les tokens expirés ou révoqués
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(unique)]
    pub token_hash: String,

    pub expires_at: DateTimeUtc,

    pub revoked: bool,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
