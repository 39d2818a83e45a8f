//! Fixed-width time buckets.
//!
//! Bucket boundaries are aligned to multiples of the bucket width counted from
//! the Unix epoch, which for minute and hour widths matches wall-clock minutes
//! and hours in UTC.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::HubError;

/// Bucket widths accepted by the aggregation feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Second,
    TenSeconds,
    ThirtySeconds,
    Minute,
    Hour,
}

impl Granularity {
    /// Parse the `interval_seconds` selector of the transaction stats stream.
    pub fn from_stats_seconds(raw: &str) -> Result<Self, HubError> {
        match raw.trim().parse::<u32>() {
            Ok(1) => Ok(Self::Second),
            Ok(10) => Ok(Self::TenSeconds),
            Ok(30) => Ok(Self::ThirtySeconds),
            Ok(60) => Ok(Self::Minute),
            _ => Err(HubError::BadRequest(
                "Invalid interval. Must be 1, 10, 30, or 60 seconds.".to_string(),
            )),
        }
    }

    /// Parse the `aggregation_type` selector of the sentiment endpoints.
    pub fn from_aggregation_type(raw: &str) -> Result<Self, HubError> {
        match raw.trim() {
            "hourly" => Ok(Self::Hour),
            "minutes" => Ok(Self::Minute),
            _ => Err(HubError::BadRequest(
                "Invalid aggregation_type. Must be 'hourly' or 'minutes'.".to_string(),
            )),
        }
    }

    pub fn step(self) -> TimeDelta {
        match self {
            Self::Second => TimeDelta::seconds(1),
            Self::TenSeconds => TimeDelta::seconds(10),
            Self::ThirtySeconds => TimeDelta::seconds(30),
            Self::Minute => TimeDelta::minutes(1),
            Self::Hour => TimeDelta::hours(1),
        }
    }

    /// How far back a fresh connection starts aggregating.
    pub fn lookback(self) -> TimeDelta {
        match self {
            Self::Second => TimeDelta::minutes(3),
            Self::TenSeconds => TimeDelta::minutes(10),
            Self::ThirtySeconds => TimeDelta::minutes(30),
            Self::Minute => TimeDelta::minutes(60),
            Self::Hour => TimeDelta::hours(24),
        }
    }

    /// Human-readable bucket label used by the sentiment series.
    pub fn label(self, at: DateTime<Utc>) -> String {
        match self {
            Self::Hour => at.format("%Y-%m-%d %H:00").to_string(),
            Self::Minute => at.format("%Y-%m-%d %H:%M").to_string(),
            _ => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Floor `at` to the start of the bucket of width `step` containing it.
pub fn align(at: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
    let step_ms = step.num_milliseconds();
    if step_ms <= 0 {
        return at;
    }
    let ms = at.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(step_ms)).unwrap_or(at)
}

/// Number of buckets [`generate`] would return for this range.
pub fn bucket_count(start: DateTime<Utc>, end: DateTime<Utc>, step: TimeDelta) -> u64 {
    if start > end || step <= TimeDelta::zero() {
        return 0;
    }
    let span_ms = (end - start).num_milliseconds();
    (span_ms / step.num_milliseconds()) as u64 + 1
}

/// Latest start at or after `start` whose series up to `end` fits in
/// `max_len` buckets.
pub fn tail_start(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: TimeDelta,
    max_len: usize,
) -> DateTime<Utc> {
    if bucket_count(start, end, step) <= max_len as u64 {
        return start;
    }
    let back = step.num_milliseconds() * (max_len.max(1) as i64 - 1);
    end - TimeDelta::milliseconds(back)
}

/// Every bucket start from `start` to the last one not after `end`, inclusive
/// of `start`, spaced exactly `step` apart.
///
/// `start > end` (or a non-positive step) yields an empty series. A range of
/// more than `max_len` buckets is rejected before anything is allocated.
pub fn generate(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: TimeDelta,
    max_len: usize,
) -> Result<Vec<DateTime<Utc>>, HubError> {
    let count = bucket_count(start, end, step);
    if count > max_len as u64 {
        return Err(HubError::BadRequest(format!(
            "time range spans {count} buckets; at most {max_len} are allowed"
        )));
    }

    let mut out = Vec::with_capacity(count as usize);
    let mut at = start;
    while at <= end && count > 0 {
        out.push(at);
        at += step;
    }
    Ok(out)
}
