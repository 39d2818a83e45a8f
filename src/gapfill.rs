//! Merge sparse per-bucket aggregate rows into a dense series.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::bucket::Granularity;
use crate::db::store::{SentimentRow, TradeStatRow};

/// How a series treats the buckets storage had nothing for.
pub trait FillPolicy {
    /// Aggregate row as returned by the store.
    type Row;
    /// Dense-series element.
    type Bucket;

    fn key(row: &Self::Row) -> DateTime<Utc>;

    /// Convert a real row, updating any carried state.
    fn real(&mut self, row: Self::Row) -> Self::Bucket;

    /// Synthesize the element for an empty bucket starting at `at`.
    fn filler(&self, at: DateTime<Utc>) -> Self::Bucket;
}

/// Emit one element per entry of `series`, in series order.
///
/// Rows whose key is not a member of `series` are dropped.
pub fn fill<P: FillPolicy>(
    policy: &mut P,
    series: &[DateTime<Utc>],
    rows: Vec<P::Row>,
) -> Vec<P::Bucket> {
    let mut by_key: HashMap<DateTime<Utc>, P::Row> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_key.insert(P::key(&row), row);
    }

    let mut out = Vec::with_capacity(series.len());
    for at in series {
        match by_key.remove(at) {
            Some(row) => out.push(policy.real(row)),
            None => out.push(policy.filler(*at)),
        }
    }

    if !by_key.is_empty() {
        tracing::debug!("gap-fill dropped {} rows outside the series", by_key.len());
    }
    out
}

/// `total_value / total_quantity`, or 0 when nothing traded.
pub fn safe_avg(total_value: f64, total_quantity: f64) -> f64 {
    if total_quantity == 0.0 {
        0.0
    } else {
        total_value / total_quantity
    }
}

// ── Sentiment: zero fill ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentBucket {
    #[serde(skip)]
    pub start: DateTime<Utc>,
    pub time_unit: String,
    pub positives: i64,
    pub negatives: i64,
    pub neutrals: i64,
}

/// Missing sentiment buckets count zero posts of every label.
pub struct ZeroFill {
    pub granularity: Granularity,
}

impl FillPolicy for ZeroFill {
    type Row = SentimentRow;
    type Bucket = SentimentBucket;

    fn key(row: &SentimentRow) -> DateTime<Utc> {
        row.bucket
    }

    fn real(&mut self, row: SentimentRow) -> SentimentBucket {
        SentimentBucket {
            start: row.bucket,
            time_unit: self.granularity.label(row.bucket),
            positives: row.positives,
            negatives: row.negatives,
            neutrals: row.neutrals,
        }
    }

    fn filler(&self, at: DateTime<Utc>) -> SentimentBucket {
        SentimentBucket {
            start: at,
            time_unit: self.granularity.label(at),
            positives: 0,
            negatives: 0,
            neutrals: 0,
        }
    }
}

// ── Trade statistics: carry the last price forward ───────────────────────

/// One trade-stats bucket on the wire. A `timestamp` repeated in a later frame
/// carries only rows that landed since, so clients add its counts instead of
/// replacing the earlier entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStatBucket {
    pub timestamp: String,
    pub symbol: String,
    #[serde(rename = "baseCurrency")]
    pub base_currency: String,
    #[serde(rename = "quoteCurrency")]
    pub quote_currency: String,
    pub buy_count: i64,
    pub buy_total_quantity: f64,
    pub buy_total_value: f64,
    pub buy_min_price: Option<f64>,
    pub buy_max_price: Option<f64>,
    pub buy_avg_price: Option<f64>,
    pub sell_count: i64,
    pub sell_total_quantity: f64,
    pub sell_total_value: f64,
    pub sell_min_price: Option<f64>,
    pub sell_max_price: Option<f64>,
    pub sell_avg_price: Option<f64>,
    pub avg_price: Option<f64>,
}

/// Quiet buckets hold the last traded price with zero volume.
///
/// Lives as long as the session so the price carries across polls.
#[derive(Debug, Clone)]
pub struct CarryForward {
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub last_price: Option<f64>,
}

impl CarryForward {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            base_currency: String::new(),
            quote_currency: String::new(),
            last_price: None,
        }
    }
}

impl FillPolicy for CarryForward {
    type Row = TradeStatRow;
    type Bucket = TradeStatBucket;

    fn key(row: &TradeStatRow) -> DateTime<Utc> {
        row.bucket
    }

    fn real(&mut self, row: TradeStatRow) -> TradeStatBucket {
        let buy_avg = safe_avg(row.buy.total_value, row.buy.total_quantity);
        let sell_avg = safe_avg(row.sell.total_value, row.sell.total_quantity);
        let avg = safe_avg(
            row.buy.total_value + row.sell.total_value,
            row.buy.total_quantity + row.sell.total_quantity,
        );

        if row.buy.count > 0 {
            self.last_price = Some(buy_avg);
        } else if row.sell.count > 0 {
            self.last_price = Some(sell_avg);
        } else if avg > 0.0 {
            self.last_price = Some(avg);
        }
        self.base_currency.clone_from(&row.base_currency);
        self.quote_currency.clone_from(&row.quote_currency);

        TradeStatBucket {
            timestamp: row.bucket.to_rfc3339(),
            symbol: row.symbol,
            base_currency: row.base_currency,
            quote_currency: row.quote_currency,
            buy_count: row.buy.count,
            buy_total_quantity: row.buy.total_quantity,
            buy_total_value: row.buy.total_value,
            buy_min_price: row.buy.min_price,
            buy_max_price: row.buy.max_price,
            buy_avg_price: Some(buy_avg),
            sell_count: row.sell.count,
            sell_total_quantity: row.sell.total_quantity,
            sell_total_value: row.sell.total_value,
            sell_min_price: row.sell.min_price,
            sell_max_price: row.sell.max_price,
            sell_avg_price: Some(sell_avg),
            avg_price: Some(avg),
        }
    }

    fn filler(&self, at: DateTime<Utc>) -> TradeStatBucket {
        let p = self.last_price;
        TradeStatBucket {
            timestamp: at.to_rfc3339(),
            symbol: self.symbol.clone(),
            base_currency: self.base_currency.clone(),
            quote_currency: self.quote_currency.clone(),
            buy_count: 0,
            buy_total_quantity: 0.0,
            buy_total_value: 0.0,
            buy_min_price: p,
            buy_max_price: p,
            buy_avg_price: p,
            sell_count: 0,
            sell_total_quantity: 0.0,
            sell_total_value: 0.0,
            sell_min_price: p,
            sell_max_price: p,
            sell_avg_price: p,
            avg_price: p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::generate;
    use crate::db::store::SideStats;
    use chrono::TimeDelta;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sentiment(bucket: i64, p: i64, n: i64, z: i64) -> SentimentRow {
        SentimentRow {
            bucket: ts(bucket),
            last_created: bucket as f64,
            positives: p,
            negatives: n,
            neutrals: z,
        }
    }

    fn side(count: i64, qty: f64, value: f64) -> SideStats {
        SideStats {
            count,
            total_quantity: qty,
            total_value: value,
            min_price: (count > 0).then(|| value / qty),
            max_price: (count > 0).then(|| value / qty),
        }
    }

    fn stat(bucket: i64, buy: SideStats, sell: SideStats) -> TradeStatRow {
        TradeStatRow {
            bucket: ts(bucket),
            last_ts_ms: bucket * 1000,
            symbol: "BTC-USDT".to_string(),
            base_currency: "BTC".to_string(),
            quote_currency: "USDT".to_string(),
            buy,
            sell,
        }
    }

    #[test]
    fn sentiment_gaps_are_zero_filled() {
        // keywords btc,eth over minutes 0..3, rows only at minute 0 and 3
        let series = generate(ts(0), ts(180), TimeDelta::minutes(1), 1_000).unwrap();
        let rows = vec![sentiment(180, 0, 1, 0), sentiment(0, 2, 0, 1)];
        let mut policy = ZeroFill { granularity: Granularity::Minute };

        let out = fill(&mut policy, &series, rows);

        let counts: Vec<(i64, i64, i64)> =
            out.iter().map(|b| (b.positives, b.negatives, b.neutrals)).collect();
        assert_eq!(counts, vec![(2, 0, 1), (0, 0, 0), (0, 0, 0), (0, 1, 0)]);
        assert_eq!(out[1].time_unit, "1970-01-01 00:01");
        assert_eq!(out[3].start, ts(180));
    }

    #[test]
    fn empty_rows_yield_one_filler_per_bucket() {
        let series = generate(ts(0), ts(600), TimeDelta::minutes(1), 1_000).unwrap();
        let mut zero = ZeroFill { granularity: Granularity::Minute };
        let out = fill(&mut zero, &series, Vec::new());
        assert_eq!(out.len(), series.len());
        assert!(out.iter().all(|b| b.positives + b.negatives + b.neutrals == 0));

        let mut carry = CarryForward::new("BTC");
        let out = fill(&mut carry, &series, Vec::new());
        assert_eq!(out.len(), series.len());
        assert!(out.iter().all(|b| b.buy_count == 0 && b.avg_price.is_none()));
    }

    #[test]
    fn carry_forward_uses_previous_not_next_price() {
        let series = generate(ts(0), ts(20), TimeDelta::seconds(10), 1_000).unwrap();
        let rows = vec![
            stat(0, side(2, 1.0, 100.0), side(0, 0.0, 0.0)),
            stat(20, side(1, 1.0, 300.0), side(0, 0.0, 0.0)),
        ];
        let mut policy = CarryForward::new("BTC");

        let out = fill(&mut policy, &series, rows);

        let gap = &out[1];
        assert_eq!(gap.buy_count, 0);
        assert_eq!(gap.buy_total_quantity, 0.0);
        assert_eq!(gap.buy_min_price, Some(100.0));
        assert_eq!(gap.buy_max_price, Some(100.0));
        assert_eq!(gap.avg_price, Some(100.0));
        assert_eq!(gap.sell_avg_price, Some(100.0));
        assert_eq!(gap.base_currency, "BTC");
        assert_eq!(policy.last_price, Some(300.0));
    }

    #[test]
    fn carry_forward_prefers_buy_then_sell_average() {
        let mut policy = CarryForward::new("BTC");
        policy.real(stat(0, side(0, 0.0, 0.0), side(1, 2.0, 50.0)));
        assert_eq!(policy.last_price, Some(25.0));

        policy.real(stat(10, side(1, 1.0, 40.0), side(1, 1.0, 10.0)));
        assert_eq!(policy.last_price, Some(40.0));

        // nothing traded: price is held
        policy.real(stat(20, side(0, 0.0, 0.0), side(0, 0.0, 0.0)));
        assert_eq!(policy.last_price, Some(40.0));
    }

    #[test]
    fn zero_quantity_row_has_zero_average() {
        let mut policy = CarryForward::new("BTC");
        let out = policy.real(stat(0, side(0, 0.0, 5.0), side(0, 0.0, 0.0)));
        assert_eq!(out.buy_avg_price, Some(0.0));
        assert_eq!(out.sell_avg_price, Some(0.0));
        assert_eq!(out.avg_price, Some(0.0));
        assert_eq!(safe_avg(10.0, 0.0), 0.0);
        assert_eq!(safe_avg(10.0, 4.0), 2.5);
    }

    #[test]
    fn carried_price_survives_between_batches() {
        let mut policy = CarryForward::new("BTC");
        let first = generate(ts(0), ts(0), TimeDelta::seconds(1), 1_000).unwrap();
        fill(&mut policy, &first, vec![stat(0, side(1, 1.0, 7.0), side(0, 0.0, 0.0))]);

        let later = generate(ts(5), ts(7), TimeDelta::seconds(1), 1_000).unwrap();
        let out = fill(&mut policy, &later, vec![stat(7, side(1, 1.0, 9.0), side(0, 0.0, 0.0))]);
        assert_eq!(out[0].avg_price, Some(7.0));
        assert_eq!(out[1].avg_price, Some(7.0));
        assert_eq!(out[2].avg_price, Some(9.0));
    }
}
