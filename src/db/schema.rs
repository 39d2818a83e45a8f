use rusqlite::Connection;
use std::path::Path;

use crate::error::HubError;

/// DDL of the landed collections the engine reads.
///
/// Ingestion owns these tables; the hub only needs them to exist when
/// bootstrapping a development database.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS big_transactions (
    id             INTEGER PRIMARY KEY,
    ts_ms          INTEGER NOT NULL,
    symbol         TEXT NOT NULL,
    base_currency  TEXT NOT NULL,
    quote_currency TEXT NOT NULL,
    side           TEXT,
    price          REAL NOT NULL,
    quantity       REAL NOT NULL,
    value          REAL NOT NULL,
    source         TEXT
);
CREATE INDEX IF NOT EXISTS idx_big_transactions_ts ON big_transactions(ts_ms);

CREATE TABLE IF NOT EXISTS reddit_posts (
    id              TEXT PRIMARY KEY,
    created_utc     REAL NOT NULL,
    keyword         TEXT NOT NULL,
    subreddit       TEXT,
    title           TEXT,
    body            TEXT,
    url             TEXT,
    score           INTEGER NOT NULL DEFAULT 0,
    sentiment_label TEXT
);
CREATE INDEX IF NOT EXISTS idx_reddit_posts_kw_created ON reddit_posts(keyword, created_utc);

CREATE TABLE IF NOT EXISTS stock_news (
    id            TEXT PRIMARY KEY,
    published_utc TEXT NOT NULL,
    title         TEXT,
    article_url   TEXT,
    publisher     TEXT,
    fetched_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_stock_news_published ON stock_news(published_utc);

CREATE TABLE IF NOT EXISTS stock_news_insights (
    news_id             TEXT NOT NULL REFERENCES stock_news(id),
    ticker              TEXT NOT NULL,
    sentiment           TEXT,
    sentiment_reasoning TEXT
);
CREATE INDEX IF NOT EXISTS idx_stock_news_insights_ticker ON stock_news_insights(ticker, news_id);

CREATE TABLE IF NOT EXISTS transactions_stats_second (
    ts_ms               INTEGER NOT NULL,
    symbol              TEXT NOT NULL,
    base_currency       TEXT NOT NULL,
    quote_currency      TEXT NOT NULL,
    source              TEXT,
    buy_count           INTEGER NOT NULL DEFAULT 0,
    buy_total_quantity  REAL NOT NULL DEFAULT 0,
    buy_total_value     REAL NOT NULL DEFAULT 0,
    buy_min_price       REAL,
    buy_max_price       REAL,
    sell_count          INTEGER NOT NULL DEFAULT 0,
    sell_total_quantity REAL NOT NULL DEFAULT 0,
    sell_total_value    REAL NOT NULL DEFAULT 0,
    sell_min_price      REAL,
    sell_max_price      REAL
);
CREATE INDEX IF NOT EXISTS idx_tx_stats_ts ON transactions_stats_second(ts_ms);

-- Reference documents, stored as JSON text.
CREATE TABLE IF NOT EXISTS coingecko_data (
    id  TEXT PRIMARY KEY,
    doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_details (
    ticker TEXT PRIMARY KEY,
    doc    TEXT NOT NULL
);
"#;

pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Create `path` (if needed) with every table the engine reads.
pub fn bootstrap(path: &Path) -> Result<(), HubError> {
    let conn = Connection::open(path)?;
    ensure_schema(&conn)?;
    tracing::info!("Schema ensured at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn bootstrapped_file_opens_read_only() {
        let path = std::env::temp_dir().join(format!("pulse-hub-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        bootstrap(&path).unwrap();
        let pool = crate::db::pool::open_ro_pool(&path, 1).unwrap();
        let conn = pool.get().unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM big_transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
        assert!(conn.execute("DELETE FROM big_transactions", []).is_err());

        drop(conn);
        drop(pool);
        let _ = std::fs::remove_file(&path);
    }
}
