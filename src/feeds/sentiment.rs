use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Feed, StoreQuery};
use crate::bucket::{generate, tail_start, Granularity};
use crate::db::store::{EventStore, SentimentRow, F_CREATED_UTC, F_KEYWORD, F_SUBREDDIT};
use crate::error::HubError;
use crate::filter::{parse_values, Case, Dimension, FilterTemplate};
use crate::gapfill::{fill, ZeroFill};

/// Keyword sentiment counts per bucket, zero-filled.
pub struct SentimentStream {
    filter: FilterTemplate,
    granularity: Granularity,
    connected_at: DateTime<Utc>,
    max_buckets: usize,
}

impl SentimentStream {
    pub fn new(
        keywords: &str,
        granularity: Granularity,
        subreddit: Option<&str>,
        connected_at: DateTime<Utc>,
        max_buckets: usize,
    ) -> Result<Self, HubError> {
        let values = parse_values("keywords", keywords, Case::Lower)?;
        let dimension = Dimension::OneOf {
            field: F_KEYWORD,
            values,
        };
        Ok(Self {
            filter: FilterTemplate::new(dimension, F_CREATED_UTC).with_eq(F_SUBREDDIT, subreddit),
            granularity,
            connected_at,
            max_buckets,
        })
    }
}

impl Feed for SentimentStream {
    type Cursor = f64;
    type Row = SentimentRow;

    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn selector(&self) -> String {
        self.filter.describe()
    }

    fn initial_cursor(&self) -> f64 {
        (self.connected_at - self.granularity.lookback()).timestamp_millis() as f64 / 1000.0
    }

    fn query(&self, cursor: &f64) -> StoreQuery<SentimentRow> {
        let pred = self.filter.since(*cursor);
        let width = self.granularity.step();
        Box::new(move |store: &dyn EventStore| store.sentiment_buckets(&pred, width))
    }

    fn cursor_of(&self, row: &SentimentRow) -> f64 {
        row.last_created
    }

    fn render(&mut self, mut rows: Vec<SentimentRow>) -> Result<Vec<Value>, HubError> {
        rows.reverse();
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(Vec::new());
        };
        let step = self.granularity.step();
        let start = tail_start(first.bucket, last.bucket, step, self.max_buckets);
        let series = generate(start, last.bucket, step, self.max_buckets)?;

        let mut policy = ZeroFill {
            granularity: self.granularity,
        };
        fill(&mut policy, &series, rows)
            .into_iter()
            .map(|b| -> Result<Value, HubError> { Ok(serde_json::to_value(b)?) })
            .collect()
    }
}
