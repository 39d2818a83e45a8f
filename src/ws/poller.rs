//! Watermark polling: each poll asks the store only for records past the
//! connection's cursor, then moves the cursor to the newest one delivered.

use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::db::store::EventStore;
use crate::error::HubError;
use crate::feeds::Feed;

/// Cursor-driven "newer than last time" reads for one connection.
///
/// Owns the connection's cursor; each [`poll`](Self::poll) returns the next
/// wire payload and advances the cursor past every record it delivered.
pub struct Poller<F: Feed> {
    feed: F,
    cursor: F::Cursor,
    store: Arc<dyn EventStore>,
}

impl<F: Feed> Poller<F> {
    pub fn new(feed: F, store: Arc<dyn EventStore>) -> Self {
        let cursor = feed.initial_cursor();
        Self {
            feed,
            cursor,
            store,
        }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn cursor(&self) -> &F::Cursor {
        &self.cursor
    }

    /// Run one poll iteration. An empty vector means "no new data".
    pub async fn poll(&mut self) -> Result<Vec<Value>, HubError> {
        let query = self.feed.query(&self.cursor);
        let store = Arc::clone(&self.store);
        let rows = tokio::task::spawn_blocking(move || query(store.as_ref())).await??;

        let Some(newest) = rows.first() else {
            tracing::debug!(feed = self.feed.name(), cursor = ?self.cursor, "no new records");
            return Ok(Vec::new());
        };

        let next = self.feed.cursor_of(newest);
        if next.partial_cmp(&self.cursor) != Some(Ordering::Greater) {
            tracing::warn!(
                feed = self.feed.name(),
                selector = %self.feed.selector(),
                cursor = ?self.cursor,
                newest = ?next,
                "store returned no records past the cursor; keeping cursor"
            );
            return Ok(Vec::new());
        }

        tracing::debug!(
            feed = self.feed.name(),
            rows = rows.len(),
            from = ?self.cursor,
            to = ?next,
            "poll advanced"
        );
        self.cursor = next;
        self.feed.render(rows)
    }
}
