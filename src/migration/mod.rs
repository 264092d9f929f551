// Migrations SeaORM, appliquées au démarrage (voir db.rs)

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_initial_tables::Migration),
        ]
    }
}

pub mod m20250101_000001_create_initial_tables;
