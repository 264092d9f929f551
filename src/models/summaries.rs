// ============================================================================
// MODÈLE : SUMMARIES
// ============================================================================
//
// Description:
//   Un résumé = une unité de travail facturable appartenant à un utilisateur.
//
// Cycle de vie (status):
//   - PROCESSING : créé au début d'une génération (crédits déjà débités)
//   - COMPLETED  : génération réussie, ou enregistrement direct (save)
//   - FAILED     : échec du LLM, crédits remboursés dans la même transaction
//   - PENDING    : réservé, jamais écrit par le backend actuel
//
// Points d'attention:
//   - Index unique partiel (user_id, video_id) WHERE status = 'COMPLETED' :
//     au plus un résumé COMPLETED par vidéo et par utilisateur
//   - credits_charged = montant débité pour CETTE ligne (remboursement exact)
//   - key_points / tags / transcript sont stockés en JSON
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
pub enum SummaryStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,

    pub title: String,
    #[sea_orm(column_type = "Json")]
    pub key_points: Json, // ["point 1", "point 2", ...]
    #[sea_orm(column_type = "Text")]
    pub full_summary: String,
    #[sea_orm(column_type = "Json")]
    pub tags: Json,
    pub status: SummaryStatus,
    pub credits_charged: i32,

    pub video_id: String,
    pub video_title: String,
    pub video_channel: String,
    pub video_duration: Option<String>,
    pub video_url: String,
    pub video_thumbnail: Option<String>,

    #[sea_orm(column_type = "Json")]
    pub transcript: Json, // segments structurés
    #[sea_orm(column_type = "Text")]
    pub transcript_text: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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

impl Model {
    pub fn key_points_list(&self) -> Vec<String> {
        string_list(&self.key_points)
    }

    pub fn tags_list(&self) -> Vec<String> {
        string_list(&self.tags)
    }
}

/// Lit une colonne JSON censée contenir un tableau de strings
fn string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
