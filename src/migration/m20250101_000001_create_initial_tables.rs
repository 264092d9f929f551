// Schéma initial: users, summaries, refresh_tokens

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Table users
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::PasswordHash).string())
                    .col(ColumnDef::new(Users::ExternalId).string().unique_key())
                    .col(ColumnDef::new(Users::Name).string())
                    .col(ColumnDef::new(Users::AvatarUrl).string())
                    .col(ColumnDef::new(Users::Plan).string_len(16).not_null().default("FREE"))
                    .col(ColumnDef::new(Users::Credits).integer().not_null().default(0))
                    .col(ColumnDef::new(Users::EmailVerified).boolean().not_null().default(false))
                    .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Users::CreditsResetAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Table summaries
        manager
            .create_table(
                Table::create()
                    .table(Summaries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Summaries::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Summaries::UserId).uuid().not_null())
                    .col(ColumnDef::new(Summaries::Title).string().not_null())
                    .col(ColumnDef::new(Summaries::KeyPoints).json().not_null())
                    .col(ColumnDef::new(Summaries::FullSummary).text().not_null())
                    .col(ColumnDef::new(Summaries::Tags).json().not_null())
                    .col(ColumnDef::new(Summaries::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Summaries::CreditsCharged).integer().not_null().default(0))
                    .col(ColumnDef::new(Summaries::VideoId).string_len(64).not_null())
                    .col(ColumnDef::new(Summaries::VideoTitle).string().not_null())
                    .col(ColumnDef::new(Summaries::VideoChannel).string().not_null())
                    .col(ColumnDef::new(Summaries::VideoDuration).string())
                    .col(ColumnDef::new(Summaries::VideoUrl).string().not_null())
                    .col(ColumnDef::new(Summaries::VideoThumbnail).string())
                    .col(ColumnDef::new(Summaries::Transcript).json().not_null())
                    .col(ColumnDef::new(Summaries::TranscriptText).text().not_null())
                    .col(ColumnDef::new(Summaries::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Summaries::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_summaries_user_id")
                            .from(Summaries::Table, Summaries::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_summaries_user_created")
                    .table(Summaries::Table)
                    .col(Summaries::UserId)
                    .col(Summaries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_summaries_user_video")
                    .table(Summaries::Table)
                    .col(Summaries::UserId)
                    .col(Summaries::VideoId)
                    .to_owned(),
            )
            .await?;

        // Au plus un résumé COMPLETED par (user, vidéo).
        // Index partiel: syntaxe identique PostgreSQL / SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_summaries_user_video_completed \
                 ON summaries (user_id, video_id) WHERE status = 'COMPLETED'",
            )
            .await?;

        // Table refresh_tokens
        manager
            .create_table(
                Table::create()
                    .table(RefreshTokens::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RefreshTokens::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RefreshTokens::UserId).uuid().not_null())
                    .col(ColumnDef::new(RefreshTokens::TokenHash).string_len(64).not_null().unique_key())
                    .col(ColumnDef::new(RefreshTokens::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(RefreshTokens::Revoked).boolean().not_null().default(false))
                    .col(ColumnDef::new(RefreshTokens::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_refresh_tokens_user_id")
                            .from(RefreshTokens::Table, RefreshTokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RefreshTokens::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Summaries::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    ExternalId,
    Name,
    AvatarUrl,
    Plan,
    Credits,
    EmailVerified,
    LastLoginAt,
    CreditsResetAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Summaries {
    Table,
    Id,
    UserId,
    Title,
    KeyPoints,
    FullSummary,
    Tags,
    Status,
    CreditsCharged,
    VideoId,
    VideoTitle,
    VideoChannel,
    VideoDuration,
    VideoUrl,
    VideoThumbnail,
    Transcript,
    TranscriptText,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RefreshTokens {
    Table,
    Id,
    UserId,
    TokenHash,
    ExpiresAt,
    Revoked,
    CreatedAt,
}
