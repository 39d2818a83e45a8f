use chrono::{DateTime, TimeDelta};
use rusqlite::types::ToSqlOutput;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use serde_json::Value;
use std::collections::HashMap;

use super::pool::DbPool;
use super::store::*;
use crate::error::HubError;
use crate::filter::{Clause, Cmp, FilterValue, Predicate};

impl ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Int(v) => ToSqlOutput::from(*v),
            Self::Real(v) => ToSqlOutput::from(*v),
            Self::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

/// Logical field → SQL column expression, per table.
type Columns = &'static [(&'static str, &'static str)];

const BIG_TX_COLUMNS: Columns = &[
    (F_TS_MS, "ts_ms"),
    (F_BASE_CURRENCY, "base_currency"),
    (F_QUOTE_CURRENCY, "quote_currency"),
    (F_SOURCE, "source"),
];

const POST_COLUMNS: Columns = &[
    (F_CREATED_UTC, "created_utc"),
    (F_KEYWORD, "keyword"),
    (F_SUBREDDIT, "subreddit"),
];

const NEWS_COLUMNS: Columns = &[
    (F_PUBLISHED_UTC, "n.published_utc"),
    (F_TICKER, "i.ticker"),
];

const STATS_COLUMNS: Columns = &[
    (F_TS_MS, "ts_ms"),
    (F_BASE_CURRENCY, "base_currency"),
    (F_QUOTE_CURRENCY, "quote_currency"),
    (F_SOURCE, "source"),
];

fn column(columns: Columns, field: &str) -> Result<&'static str, HubError> {
    columns
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, c)| *c)
        .ok_or_else(|| HubError::Internal(format!("field not filterable here: {field}")))
}

/// Render a predicate as a parameterised `WHERE` body.
fn render_where(pred: &Predicate, columns: Columns) -> Result<(String, Vec<FilterValue>), HubError> {
    let mut parts: Vec<String> = Vec::with_capacity(pred.clauses.len());
    let mut params: Vec<FilterValue> = Vec::new();

    for clause in &pred.clauses {
        match clause {
            Clause::In { field, values } => {
                let col = column(columns, field)?;
                if values.is_empty() {
                    parts.push("0".to_string());
                    continue;
                }
                let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                parts.push(format!("{col} IN ({placeholders})"));
                params.extend(values.iter().cloned().map(FilterValue::Text));
            }
            Clause::EitherEq { fields, value } => {
                let a = column(columns, fields[0])?;
                let b = column(columns, fields[1])?;
                parts.push(format!("({a} = ? OR {b} = ?)"));
                params.push(FilterValue::Text(value.clone()));
                params.push(FilterValue::Text(value.clone()));
            }
            Clause::Eq { field, value } => {
                let col = column(columns, field)?;
                parts.push(format!("{col} = ?"));
                params.push(FilterValue::Text(value.clone()));
            }
            Clause::Compare { field, op, value } => {
                let col = column(columns, field)?;
                let op = match op {
                    Cmp::Gt => ">",
                    Cmp::Gte => ">=",
                    Cmp::Lte => "<=",
                };
                parts.push(format!("{col} {op} ?"));
                params.push(value.clone());
            }
        }
    }

    let sql = if parts.is_empty() {
        "1 = 1".to_string()
    } else {
        parts.join(" AND ")
    };
    Ok((sql, params))
}

/// [`EventStore`] over a pool of read-only SQLite connections.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventStore for SqliteStore {
    fn big_transactions(
        &self,
        filter: &Predicate,
        limit: usize,
    ) -> Result<Vec<BigTransaction>, HubError> {
        let (where_sql, mut params) = render_where(filter, BIG_TX_COLUMNS)?;
        params.push(FilterValue::Int(limit as i64));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, ts_ms, symbol, base_currency, quote_currency, side, price, quantity, value, source
             FROM big_transactions
             WHERE {where_sql}
             ORDER BY ts_ms DESC, id DESC
             LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(BigTransaction {
                    id: row.get(0)?,
                    ts_ms: row.get(1)?,
                    symbol: row.get(2)?,
                    base_currency: row.get(3)?,
                    quote_currency: row.get(4)?,
                    side: row.get(5)?,
                    price: row.get(6)?,
                    quantity: row.get(7)?,
                    value: row.get(8)?,
                    source: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn posts(&self, filter: &Predicate, limit: usize) -> Result<Vec<Post>, HubError> {
        let (where_sql, mut params) = render_where(filter, POST_COLUMNS)?;
        params.push(FilterValue::Int(limit as i64));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, created_utc, keyword, subreddit, title, body, url, score, sentiment_label
             FROM reddit_posts
             WHERE {where_sql}
             ORDER BY created_utc DESC
             LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(Post {
                    id: row.get(0)?,
                    created_utc: row.get(1)?,
                    keyword: row.get(2)?,
                    subreddit: row.get(3)?,
                    title: row.get(4)?,
                    body: row.get(5)?,
                    url: row.get(6)?,
                    score: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
                    sentiment_label: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn news(&self, filter: &Predicate, limit: usize) -> Result<Vec<NewsArticle>, HubError> {
        let (where_sql, mut params) = render_where(filter, NEWS_COLUMNS)?;
        params.push(FilterValue::Int(limit as i64));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT n.id, n.published_utc, n.title, n.article_url, n.publisher, n.fetched_at
             FROM stock_news n
             JOIN stock_news_insights i ON i.news_id = n.id
             WHERE {where_sql}
             ORDER BY n.published_utc DESC
             LIMIT ?"
        ))?;
        let mut articles = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(NewsArticle {
                    id: row.get(0)?,
                    published_utc: row.get(1)?,
                    title: row.get(2)?,
                    article_url: row.get(3)?,
                    publisher: row.get(4)?,
                    fetched_at: row.get(5)?,
                    insights: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        attach_insights(&conn, &mut articles)?;
        Ok(articles)
    }

    fn trade_stat_buckets(
        &self,
        filter: &Predicate,
        width: TimeDelta,
    ) -> Result<Vec<TradeStatRow>, HubError> {
        let width_ms = width.num_milliseconds().max(1);
        let (where_sql, params) = render_where(filter, STATS_COLUMNS)?;

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT (ts_ms / {width_ms}) * {width_ms} AS bucket_ms, MAX(ts_ms),
                    MIN(symbol), MIN(base_currency), MIN(quote_currency),
                    COALESCE(SUM(buy_count), 0), COALESCE(SUM(buy_total_quantity), 0),
                    COALESCE(SUM(buy_total_value), 0), MIN(buy_min_price), MAX(buy_max_price),
                    COALESCE(SUM(sell_count), 0), COALESCE(SUM(sell_total_quantity), 0),
                    COALESCE(SUM(sell_total_value), 0), MIN(sell_min_price), MAX(sell_max_price)
             FROM transactions_stats_second
             WHERE {where_sql}
             GROUP BY bucket_ms
             ORDER BY bucket_ms DESC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let bucket_ms: i64 = row.get(0)?;
                Ok(TradeStatRow {
                    bucket: DateTime::from_timestamp_millis(bucket_ms).unwrap_or_default(),
                    last_ts_ms: row.get(1)?,
                    symbol: row.get(2)?,
                    base_currency: row.get(3)?,
                    quote_currency: row.get(4)?,
                    buy: SideStats {
                        count: row.get(5)?,
                        total_quantity: row.get(6)?,
                        total_value: row.get(7)?,
                        min_price: row.get(8)?,
                        max_price: row.get(9)?,
                    },
                    sell: SideStats {
                        count: row.get(10)?,
                        total_quantity: row.get(11)?,
                        total_value: row.get(12)?,
                        min_price: row.get(13)?,
                        max_price: row.get(14)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn sentiment_buckets(
        &self,
        filter: &Predicate,
        width: TimeDelta,
    ) -> Result<Vec<SentimentRow>, HubError> {
        let width_s = width.num_seconds().max(1);
        let (where_sql, params) = render_where(filter, POST_COLUMNS)?;

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST(created_utc / {width_s} AS INTEGER) * {width_s} AS bucket_s,
                    MAX(created_utc),
                    SUM(CASE WHEN sentiment_label = 'positive' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN sentiment_label = 'negative' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN sentiment_label = 'neutral' THEN 1 ELSE 0 END)
             FROM reddit_posts
             WHERE {where_sql}
             GROUP BY bucket_s
             ORDER BY bucket_s DESC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let bucket_s: i64 = row.get(0)?;
                Ok(SentimentRow {
                    bucket: DateTime::from_timestamp(bucket_s, 0).unwrap_or_default(),
                    last_created: row.get(1)?,
                    positives: row.get(2)?,
                    negatives: row.get(3)?,
                    neutrals: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn cryptos(&self) -> Result<Vec<Value>, HubError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, doc FROM coingecko_data ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, doc)| -> Result<Value, HubError> {
                let mut value: Value = serde_json::from_str(&doc)?;
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("_id".to_string(), Value::String(id));
                }
                Ok(value)
            })
            .collect()
    }

    fn stock_details(&self, ticker: &str) -> Result<Option<Value>, HubError> {
        let conn = self.pool.get()?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM stock_details WHERE ticker = ?1",
                params![ticker],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str::<Value>(&d)).transpose()?)
    }
}

fn attach_insights(conn: &Connection, articles: &mut [NewsArticle]) -> Result<(), HubError> {
    if articles.is_empty() {
        return Ok(());
    }
    let placeholders = articles.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT news_id, ticker, sentiment, sentiment_reasoning
         FROM stock_news_insights
         WHERE news_id IN ({placeholders})
         ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = articles.iter().map(|a| a.id.as_str());
    let rows = stmt
        .query_map(params_from_iter(ids), |row| {
            Ok((
                row.get::<_, String>(0)?,
                Insight {
                    ticker: row.get(1)?,
                    sentiment: row.get(2)?,
                    sentiment_reasoning: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_id: HashMap<String, Vec<Insight>> = HashMap::new();
    for (news_id, insight) in rows {
        by_id.entry(news_id).or_default().push(insight);
    }
    for article in articles.iter_mut() {
        article.insights = by_id.remove(&article.id).unwrap_or_default();
    }
    Ok(())
}
