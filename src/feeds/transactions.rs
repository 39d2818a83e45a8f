use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use super::{Feed, StoreQuery};
use crate::db::store::{BigTransaction, EventStore, F_BASE_CURRENCY, F_QUOTE_CURRENCY, F_SOURCE, F_TS_MS};
use crate::error::HubError;
use crate::filter::{Dimension, FilterTemplate};

#[derive(Debug, Serialize)]
struct BigTransactionFrame<'a> {
    #[serde(rename = "_id")]
    id: String,
    timestamp: String,
    symbol: &'a str,
    #[serde(rename = "baseCurrency")]
    base_currency: &'a str,
    #[serde(rename = "quoteCurrency")]
    quote_currency: &'a str,
    side: Option<&'a str>,
    price: f64,
    quantity: f64,
    value: f64,
    source: Option<&'a str>,
}

/// Large trade prints, optionally restricted to one currency on either leg.
pub struct BigTransactions {
    filter: FilterTemplate,
    limit: usize,
}

impl BigTransactions {
    pub fn all(source: Option<&str>, limit: usize) -> Self {
        Self {
            filter: FilterTemplate::new(Dimension::All, F_TS_MS).with_eq(F_SOURCE, source),
            limit,
        }
    }

    /// Prints where `currency` is the base or the quote currency.
    pub fn for_currency(currency: &str, source: Option<&str>, limit: usize) -> Result<Self, HubError> {
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(HubError::BadRequest("pair must not be empty".to_string()));
        }
        let dimension = Dimension::EitherOf {
            fields: [F_BASE_CURRENCY, F_QUOTE_CURRENCY],
            value: currency,
        };
        Ok(Self {
            filter: FilterTemplate::new(dimension, F_TS_MS).with_eq(F_SOURCE, source),
            limit,
        })
    }
}

impl Feed for BigTransactions {
    type Cursor = i64;
    type Row = BigTransaction;

    fn name(&self) -> &'static str {
        "big_transactions"
    }

    fn selector(&self) -> String {
        self.filter.describe()
    }

    fn initial_cursor(&self) -> i64 {
        0
    }

    fn query(&self, cursor: &i64) -> StoreQuery<BigTransaction> {
        let pred = self.filter.since(*cursor);
        let limit = self.limit;
        Box::new(move |store: &dyn EventStore| store.big_transactions(&pred, limit))
    }

    fn cursor_of(&self, row: &BigTransaction) -> i64 {
        row.ts_ms
    }

    fn render(&mut self, rows: Vec<BigTransaction>) -> Result<Vec<Value>, HubError> {
        rows.iter()
            .map(|t| -> Result<Value, HubError> {
                let frame = BigTransactionFrame {
                    id: t.id.to_string(),
                    timestamp: DateTime::from_timestamp_millis(t.ts_ms)
                        .unwrap_or_default()
                        .to_rfc3339(),
                    symbol: &t.symbol,
                    base_currency: &t.base_currency,
                    quote_currency: &t.quote_currency,
                    side: t.side.as_deref(),
                    price: t.price,
                    quantity: t.quantity,
                    value: t.value,
                    source: t.source.as_deref(),
                };
                Ok(serde_json::to_value(frame)?)
            })
            .collect()
    }
}
