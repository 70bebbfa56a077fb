use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use tracing::info;

use crate::config::AppConfig;
use crate::entities;

/// Establishes the sea-orm connection pool from application configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("database connection established");
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    db.execute(backend.build(stmt.if_not_exists())).await?;
    Ok(())
}

/// Creates any missing tables from the entity definitions. Used on startup
/// when `auto_migrate` is set and by the test harness.
pub async fn bootstrap_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, entities::Product).await?;
    create_table(db, entities::CartItem).await?;
    create_table(db, entities::Proforma).await?;
    create_table(db, entities::ProformaItem).await?;
    create_table(db, entities::ApprovalAction).await?;
    create_table(db, entities::Order).await?;
    create_table(db, entities::OrderItem).await?;
    create_table(db, entities::Supplier).await?;
    create_table(db, entities::Activity).await?;

    info!("schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    // The sqlite backend caps decimal precision at 16; every money column
    // must render within that or startup dies here.
    #[tokio::test]
    async fn bootstrap_succeeds_on_sqlite_and_is_idempotent() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "a_test_secret_key_that_is_long_enough_for_validation".into(),
            "127.0.0.1".into(),
            0,
        );
        let db = establish_connection(&cfg).await.unwrap();

        bootstrap_schema(&db).await.unwrap();
        bootstrap_schema(&db).await.unwrap();
    }
}
