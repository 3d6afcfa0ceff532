use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::{submission, testcase};

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    // Set connection pool options
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("autograde_server::entity::*")
        .sync(&db)
        .await?;

    ensure_indexes(&db).await;

    Ok(db)
}

/// Ensure lookup indexes exist.
///
/// SeaORM's schema-sync doesn't create non-unique foreign-key indexes, so they
/// are added manually on startup. Failures are logged, not fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) {
    let backend = db.get_database_backend();

    let indexes = [
        (
            "idx_testcase_assignment_position",
            Index::create()
                .if_not_exists()
                .name("idx_testcase_assignment_position")
                .table(testcase::Entity)
                .col(testcase::Column::AssignmentId)
                .col(testcase::Column::Position)
                .to_owned(),
        ),
        (
            "idx_submission_assignment",
            Index::create()
                .if_not_exists()
                .name("idx_submission_assignment")
                .table(submission::Entity)
                .col(submission::Column::AssignmentId)
                .to_owned(),
        ),
    ];

    for (name, stmt) in indexes {
        match db.execute_raw(backend.build(&stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }
}
