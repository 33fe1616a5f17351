use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use utils::assets::asset_dir;

pub mod entities;
pub mod events;
pub mod models;

pub use sea_orm::{DbErr, SqlErr, TransactionTrait};

pub type DbPool = DatabaseConnection;

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

/// Default location of the SQLite database inside the asset directory.
pub fn default_database_url() -> std::io::Result<String> {
    Ok(format!(
        "sqlite://{}?mode=rwc",
        asset_dir()?.join("db.sqlite").to_string_lossy()
    ))
}

impl DBService {
    /// Connects and brings the schema up to date.
    pub async fn new(database_url: &str) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options.sqlx_logging(false);

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        tracing::debug!("database migrations applied");
        Ok(DBService { pool })
    }

    pub async fn close(self) -> Result<(), DbErr> {
        self.pool.close().await
    }
}
