use serde::Serialize;
use serde_json::{json, Value};

use super::{Feed, StoreQuery};
use crate::db::store::{EventStore, NewsArticle, F_PUBLISHED_UTC, F_TICKER};
use crate::error::HubError;
use crate::filter::{parse_values, Case, Dimension, FilterTemplate};

/// Lowest possible `published_utc`; every stored article compares greater.
const MIN_PUBLISHED: &str = "0001-01-01T00:00:00+00:00";

#[derive(Debug, Serialize)]
struct NewsFrame<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    published_utc: &'a str,
    title: Option<&'a str>,
    article_url: Option<&'a str>,
    publisher: Option<&'a str>,
    fetched_at: Option<&'a str>,
    tickers: Vec<&'a str>,
    ticker_sentiment: Value,
}

/// News articles with an insight for any requested ticker.
pub struct TickerNews {
    filter: FilterTemplate,
    tickers: Vec<String>,
    limit: usize,
}

impl TickerNews {
    pub fn new(tickers: &str, limit: usize) -> Result<Self, HubError> {
        let tickers = parse_values("tickers", tickers, Case::Upper)?;
        let dimension = Dimension::OneOf {
            field: F_TICKER,
            values: tickers.clone(),
        };
        Ok(Self {
            filter: FilterTemplate::new(dimension, F_PUBLISHED_UTC),
            tickers,
            limit,
        })
    }

    /// Sentiment of the last insight about a requested ticker, or `{}`.
    fn ticker_sentiment(&self, article: &NewsArticle) -> Value {
        article
            .insights
            .iter()
            .filter(|i| self.tickers.contains(&i.ticker))
            .next_back()
            .map(|i| {
                json!({
                    "sentiment": i.sentiment,
                    "sentiment_reasoning": i.sentiment_reasoning,
                })
            })
            .unwrap_or_else(|| json!({}))
    }
}

impl Feed for TickerNews {
    type Cursor = String;
    type Row = NewsArticle;

    fn name(&self) -> &'static str {
        "ticker_news"
    }

    fn selector(&self) -> String {
        self.filter.describe()
    }

    fn initial_cursor(&self) -> String {
        MIN_PUBLISHED.to_string()
    }

    fn query(&self, cursor: &String) -> StoreQuery<NewsArticle> {
        let pred = self.filter.since(cursor.clone());
        let limit = self.limit;
        Box::new(move |store: &dyn EventStore| store.news(&pred, limit))
    }

    fn cursor_of(&self, row: &NewsArticle) -> String {
        row.published_utc.clone()
    }

    fn render(&mut self, rows: Vec<NewsArticle>) -> Result<Vec<Value>, HubError> {
        rows.iter()
            .map(|a| -> Result<Value, HubError> {
                let frame = NewsFrame {
                    id: &a.id,
                    published_utc: &a.published_utc,
                    title: a.title.as_deref(),
                    article_url: a.article_url.as_deref(),
                    publisher: a.publisher.as_deref(),
                    fetched_at: a.fetched_at.as_deref(),
                    tickers: a.insights.iter().map(|i| i.ticker.as_str()).collect(),
                    ticker_sentiment: self.ticker_sentiment(a),
                };
                Ok(serde_json::to_value(frame)?)
            })
            .collect()
    }
}
