pub mod endpoint_repo;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

/// Opens (and creates if missing) the SQLite database at the configured path.
///
/// # Errors
/// Returns `sqlx::Error` if the file cannot be opened.
pub async fn init_pool(database_path: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    SqlitePoolOptions::new().max_connections(5).connect_with(options).await
}
