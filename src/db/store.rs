use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::error::HubError;
use crate::filter::Predicate;

// ── Logical field names understood by every store ────────────────────────

pub const F_TS_MS: &str = "ts_ms";
pub const F_BASE_CURRENCY: &str = "base_currency";
pub const F_QUOTE_CURRENCY: &str = "quote_currency";
pub const F_SOURCE: &str = "source";
pub const F_KEYWORD: &str = "keyword";
pub const F_SUBREDDIT: &str = "subreddit";
pub const F_CREATED_UTC: &str = "created_utc";
pub const F_TICKER: &str = "ticker";
pub const F_PUBLISHED_UTC: &str = "published_utc";

// ── Records ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BigTransaction {
    pub id: i64,
    pub ts_ms: i64,
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub side: Option<String>,
    pub price: f64,
    pub quantity: f64,
    pub value: f64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    /// Epoch seconds.
    pub created_utc: f64,
    pub keyword: String,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub score: i64,
    pub sentiment_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub ticker: String,
    pub sentiment: Option<String>,
    pub sentiment_reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsArticle {
    pub id: String,
    /// ISO-8601, compared as text.
    pub published_utc: String,
    pub title: Option<String>,
    pub article_url: Option<String>,
    pub publisher: Option<String>,
    pub fetched_at: Option<String>,
    pub insights: Vec<Insight>,
}

/// Accumulators for one trade side within a bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideStats {
    pub count: i64,
    pub total_quantity: f64,
    pub total_value: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// One bucket of trade statistics that had at least one underlying row.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStatRow {
    pub bucket: DateTime<Utc>,
    /// Newest underlying row in the bucket.
    pub last_ts_ms: i64,
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub buy: SideStats,
    pub sell: SideStats,
}

/// Sentiment label counts for one bucket that had at least one post.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentRow {
    pub bucket: DateTime<Utc>,
    /// Newest `created_utc` in the bucket.
    pub last_created: f64,
    pub positives: i64,
    pub negatives: i64,
    pub neutrals: i64,
}

/// Read-only access to the landed collections.
///
/// Calls block; async callers go through `spawn_blocking`. Record reads are
/// newest first and capped at `limit`; bucket reads return one row per
/// non-empty bucket of width `width`, newest bucket first.
pub trait EventStore: Send + Sync {
    fn big_transactions(
        &self,
        filter: &Predicate,
        limit: usize,
    ) -> Result<Vec<BigTransaction>, HubError>;

    fn posts(&self, filter: &Predicate, limit: usize) -> Result<Vec<Post>, HubError>;

    fn news(&self, filter: &Predicate, limit: usize) -> Result<Vec<NewsArticle>, HubError>;

    fn trade_stat_buckets(
        &self,
        filter: &Predicate,
        width: TimeDelta,
    ) -> Result<Vec<TradeStatRow>, HubError>;

    fn sentiment_buckets(
        &self,
        filter: &Predicate,
        width: TimeDelta,
    ) -> Result<Vec<SentimentRow>, HubError>;

    /// Every CoinGecko market document, each with its key under `_id`.
    fn cryptos(&self) -> Result<Vec<Value>, HubError>;

    /// Company reference document for an exact ticker.
    fn stock_details(&self, ticker: &str) -> Result<Option<Value>, HubError>;
}
