use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Feed, StoreQuery};
use crate::bucket::{generate, tail_start, Granularity};
use crate::db::store::{
    EventStore, TradeStatRow, F_BASE_CURRENCY, F_QUOTE_CURRENCY, F_SOURCE, F_TS_MS,
};
use crate::error::HubError;
use crate::filter::{Dimension, FilterTemplate};
use crate::gapfill::{fill, CarryForward, FillPolicy};

/// Per-bucket trade statistics for one currency, gap-filled with the last price.
pub struct TradeStats {
    filter: FilterTemplate,
    granularity: Granularity,
    connected_at: DateTime<Utc>,
    max_buckets: usize,
    carry: CarryForward,
}

impl TradeStats {
    pub fn new(
        symbol: &str,
        granularity: Granularity,
        source: Option<&str>,
        connected_at: DateTime<Utc>,
        max_buckets: usize,
    ) -> Result<Self, HubError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(HubError::BadRequest("symbol must not be empty".to_string()));
        }
        let dimension = Dimension::EitherOf {
            fields: [F_BASE_CURRENCY, F_QUOTE_CURRENCY],
            value: symbol.clone(),
        };
        Ok(Self {
            filter: FilterTemplate::new(dimension, F_TS_MS).with_eq(F_SOURCE, source),
            granularity,
            connected_at,
            max_buckets,
            carry: CarryForward::new(&symbol),
        })
    }
}

impl Feed for TradeStats {
    type Cursor = i64;
    type Row = TradeStatRow;

    fn name(&self) -> &'static str {
        "transaction_stats"
    }

    fn selector(&self) -> String {
        self.filter.describe()
    }

    /// Aggregation starts one lookback window before the connection.
    fn initial_cursor(&self) -> i64 {
        (self.connected_at - self.granularity.lookback()).timestamp_millis()
    }

    fn query(&self, cursor: &i64) -> StoreQuery<TradeStatRow> {
        let pred = self.filter.since(*cursor);
        let width = self.granularity.step();
        Box::new(move |store: &dyn EventStore| store.trade_stat_buckets(&pred, width))
    }

    /// Newest underlying row, so a bucket's rows are never counted twice.
    fn cursor_of(&self, row: &TradeStatRow) -> i64 {
        row.last_ts_ms
    }

    /// A batch wider than `max_buckets` keeps only its newest buckets; older
    /// rows still move the carried price.
    fn render(&mut self, mut rows: Vec<TradeStatRow>) -> Result<Vec<Value>, HubError> {
        rows.reverse();
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(Vec::new());
        };
        let step = self.granularity.step();
        let end = last.bucket;
        let start = tail_start(first.bucket, end, step, self.max_buckets);
        let series = generate(start, end, step, self.max_buckets)?;

        let (older, rows): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| r.bucket < start);
        if !older.is_empty() {
            tracing::debug!(skipped = older.len(), "trade stats batch wider than the bucket cap");
        }
        for row in older {
            self.carry.real(row);
        }

        fill(&mut self.carry, &series, rows)
            .into_iter()
            .map(|b| -> Result<Value, HubError> { Ok(serde_json::to_value(b)?) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::SideStats;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn row(bucket: i64, buys: i64, value: f64) -> TradeStatRow {
        TradeStatRow {
            bucket: ts(bucket),
            last_ts_ms: bucket * 1000 + 900,
            symbol: "BTC-USDT".to_string(),
            base_currency: "BTC".to_string(),
            quote_currency: "USDT".to_string(),
            buy: SideStats {
                count: buys,
                total_quantity: buys as f64,
                total_value: value,
                min_price: Some(value / buys as f64),
                max_price: Some(value / buys as f64),
            },
            sell: SideStats::default(),
        }
    }

    #[test]
    fn initial_cursor_is_lookback_before_connect() {
        let feed = TradeStats::new("btc", Granularity::Second, None, ts(1_000), 1_000).unwrap();
        assert_eq!(feed.initial_cursor(), (1_000 - 180) * 1000);

        let feed = TradeStats::new("btc", Granularity::Minute, None, ts(10_000), 1_000).unwrap();
        assert_eq!(feed.initial_cursor(), (10_000 - 3_600) * 1000);
    }

    #[test]
    fn render_orders_ascending_and_fills_between_real_buckets() {
        let mut feed = TradeStats::new("btc", Granularity::TenSeconds, None, ts(0), 1_000).unwrap();
        // newest first, as the store returns them
        let out = feed.render(vec![row(40, 1, 200.0), row(10, 2, 200.0)]).unwrap();

        let stamps: Vec<&str> = out.iter().map(|v| v["timestamp"].as_str().unwrap()).collect();
        assert_eq!(
            stamps,
            vec![
                "1970-01-01T00:00:10+00:00",
                "1970-01-01T00:00:20+00:00",
                "1970-01-01T00:00:30+00:00",
                "1970-01-01T00:00:40+00:00",
            ]
        );
        assert_eq!(out[1]["buy_count"], 0);
        assert_eq!(out[1]["avg_price"], 100.0);
        assert_eq!(out[2]["sell_min_price"], 100.0);
        assert_eq!(out[3]["avg_price"], 200.0);
        assert_eq!(out[1]["baseCurrency"], "BTC");
    }

    #[test]
    fn wide_batch_keeps_newest_buckets_and_carries_older_price() {
        let mut feed = TradeStats::new("btc", Granularity::Second, None, ts(0), 3).unwrap();
        let out = feed.render(vec![row(1_000, 1, 50.0), row(0, 1, 7.0)]).unwrap();

        let stamps: Vec<&str> = out.iter().map(|v| v["timestamp"].as_str().unwrap()).collect();
        assert_eq!(
            stamps,
            vec![
                "1970-01-01T00:16:38+00:00",
                "1970-01-01T00:16:39+00:00",
                "1970-01-01T00:16:40+00:00",
            ]
        );
        assert_eq!(out[0]["buy_count"], 0);
        assert_eq!(out[0]["avg_price"], 7.0);
        assert_eq!(out[2]["avg_price"], 50.0);
    }

    #[test]
    fn cursor_tracks_newest_underlying_row() {
        let feed = TradeStats::new("btc", Granularity::Second, None, ts(0), 1_000).unwrap();
        assert_eq!(feed.cursor_of(&row(40, 1, 1.0)), 40_900);
    }
}
