use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;

use crate::error::HubError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Create a read-only SQLite connection pool for the given database file.
///
/// The engine never writes, so every pooled connection is opened read-only.
pub fn open_ro_pool(path: &Path, max_size: u32) -> Result<DbPool, HubError> {
    if !path.exists() {
        return Err(HubError::Db(format!("DB not found: {}", path.display())));
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let manager = SqliteConnectionManager::file(path).with_flags(flags);
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    tracing::info!("Opened read-only pool ({max_size}) for {}", path.display());
    Ok(pool)
}

/// Single-connection in-memory pool, schema applied.
#[cfg(test)]
pub fn memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| super::schema::ensure_schema(conn));
    Pool::builder().max_size(1).build(manager).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_db_error() {
        let err = open_ro_pool(Path::new("/nonexistent/pulse.db"), 2).unwrap_err();
        assert!(matches!(err, HubError::Db(_)));
    }
}
