//! Feed kinds served over the streaming endpoints.
//!
//! A feed is chosen once per connection and supplies everything the poll loop
//! needs that differs between kinds: the cursor type and its starting value,
//! the store read for "newer than cursor", how to advance the cursor from a
//! batch, and how a batch becomes wire records (including any gap filling).

pub mod news;
pub mod posts;
pub mod sentiment;
pub mod trade_stats;
pub mod transactions;

use serde_json::Value;
use std::fmt;

use crate::db::store::EventStore;
use crate::error::HubError;

/// A single deferred store read, run on the blocking pool.
pub type StoreQuery<R> = Box<dyn FnOnce(&dyn EventStore) -> Result<Vec<R>, HubError> + Send>;

pub trait Feed: Send + 'static {
    type Cursor: PartialOrd + Clone + fmt::Debug + Send + 'static;
    type Row: Send + 'static;

    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Dimension selector for log lines.
    fn selector(&self) -> String;

    /// Cursor of a fresh connection.
    fn initial_cursor(&self) -> Self::Cursor;

    /// Store read for rows strictly newer than `cursor`, newest first.
    fn query(&self, cursor: &Self::Cursor) -> StoreQuery<Self::Row>;

    /// Cursor value represented by a row.
    fn cursor_of(&self, row: &Self::Row) -> Self::Cursor;

    /// Turn a newest-first batch into the wire payload.
    fn render(&mut self, rows: Vec<Self::Row>) -> Result<Vec<Value>, HubError>;
}
