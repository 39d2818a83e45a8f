use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use super::{Feed, StoreQuery};
use crate::db::store::{EventStore, Post, F_CREATED_UTC, F_KEYWORD, F_SUBREDDIT};
use crate::error::HubError;
use crate::filter::{parse_values, Case, Dimension, FilterTemplate};

#[derive(Debug, Serialize)]
struct PostFrame<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    created_utc: String,
    keyword: &'a str,
    subreddit: Option<&'a str>,
    title: Option<&'a str>,
    body: Option<&'a str>,
    url: Option<&'a str>,
    score: i64,
    sentiment_label: Option<&'a str>,
}

/// Epoch seconds (fractional) as ISO-8601.
pub(crate) fn epoch_secs_to_iso(secs: f64) -> String {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .unwrap_or_default()
        .to_rfc3339()
}

/// Social posts matching any of a set of keywords.
pub struct KeywordPosts {
    filter: FilterTemplate,
    limit: usize,
}

impl KeywordPosts {
    pub fn new(keywords: &str, subreddit: Option<&str>, limit: usize) -> Result<Self, HubError> {
        let values = parse_values("keywords", keywords, Case::Lower)?;
        let dimension = Dimension::OneOf {
            field: F_KEYWORD,
            values,
        };
        Ok(Self {
            filter: FilterTemplate::new(dimension, F_CREATED_UTC).with_eq(F_SUBREDDIT, subreddit),
            limit,
        })
    }
}

impl Feed for KeywordPosts {
    type Cursor = f64;
    type Row = Post;

    fn name(&self) -> &'static str {
        "keyword_posts"
    }

    fn selector(&self) -> String {
        self.filter.describe()
    }

    fn initial_cursor(&self) -> f64 {
        0.0
    }

    fn query(&self, cursor: &f64) -> StoreQuery<Post> {
        let pred = self.filter.since(*cursor);
        let limit = self.limit;
        Box::new(move |store: &dyn EventStore| store.posts(&pred, limit))
    }

    fn cursor_of(&self, row: &Post) -> f64 {
        row.created_utc
    }

    fn render(&mut self, rows: Vec<Post>) -> Result<Vec<Value>, HubError> {
        rows.iter()
            .map(|p| -> Result<Value, HubError> {
                let frame = PostFrame {
                    id: &p.id,
                    created_utc: epoch_secs_to_iso(p.created_utc),
                    keyword: &p.keyword,
                    subreddit: p.subreddit.as_deref(),
                    title: p.title.as_deref(),
                    body: p.body.as_deref(),
                    url: p.url.as_deref(),
                    score: p.score,
                    sentiment_label: p.sentiment_label.as_deref(),
                };
                Ok(serde_json::to_value(frame)?)
            })
            .collect()
    }
}
