//! Calendar-day bucketing for attendance identity.
//!
//! Every instant is converted to UTC first and then truncated to midnight, so
//! two inputs on the same UTC calendar day always produce the same key no
//! matter which offset or time of day they carried.

use crate::error::{RecordsError, RecordsResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_instant(t: DateTime<Utc>) -> Self {
        Self(t.date_naive())
    }

    pub fn from_date(d: NaiveDate) -> Self {
        Self(d)
    }

    pub fn today() -> Self {
        Self::from_instant(Utc::now())
    }

    /// Parses the textual forms accepted on the wire: RFC 3339 with an offset,
    /// a bare `YYYY-MM-DD`, or a naive datetime that is taken to be UTC.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
            return Self::bounded(Self::from_instant(dt.with_timezone(&Utc)));
        }
        if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
            return Self::bounded(Self(d));
        }
        NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
            .and_then(|ndt| Self::bounded(Self::from_instant(ndt.and_utc())))
    }

    pub fn from_epoch_millis(ms: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(ms)
            .map(Self::from_instant)
            .and_then(Self::bounded)
    }

    /// Days read from the wire must have a following midnight to end on.
    fn bounded(key: Self) -> Option<Self> {
        key.0.succ_opt().map(|_| key)
    }

    /// Normalizes an optional JSON field. Missing or `null` means "now";
    /// numbers are epoch milliseconds.
    pub fn from_json(value: Option<&serde_json::Value>, field: &str) -> RecordsResult<Self> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::today()),
            Some(v) => Self::from_json_value(v)
                .ok_or_else(|| RecordsError::validation(format!("{field} is not a valid date"))),
        }
    }

    /// Like `from_json` but keeps absence distinguishable, for per-entry overrides.
    pub fn from_json_opt(
        value: Option<&serde_json::Value>,
        field: &str,
    ) -> RecordsResult<Option<Self>> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(_) => Self::from_json(value, field).map(Some),
        }
    }

    fn from_json_value(v: &serde_json::Value) -> Option<Self> {
        if let Some(s) = v.as_str() {
            return Self::parse(s);
        }
        if let Some(ms) = v.as_i64() {
            return Self::from_epoch_millis(ms);
        }
        v.as_f64()
            .filter(|f| f.is_finite())
            .and_then(|f| Self::from_epoch_millis(f as i64))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Inclusive start of the day, midnight UTC.
    pub fn start(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end of the day, the next midnight UTC. `None` on the last
    /// representable calendar day.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.0
            .succ_opt()
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    /// `[dayStart, dayEnd)` as unix seconds, the form used in range queries.
    pub fn range(&self) -> RecordsResult<(i64, i64)> {
        let end = self.end().ok_or_else(|| {
            RecordsError::validation(format!("date {} is out of range", self.0))
        })?;
        Ok((self.start().timestamp(), end.timestamp()))
    }

    pub fn to_storage(&self) -> i64 {
        self.start().timestamp()
    }

    pub fn from_storage(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self::from_instant)
    }

    pub fn month_name(&self) -> &'static str {
        match self.0.month() {
            1 => "January",
            2 => "February",
            3 => "March",
            4 => "April",
            5 => "May",
            6 => "June",
            7 => "July",
            8 => "August",
            9 => "September",
            10 => "October",
            11 => "November",
            _ => "December",
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.start().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// RFC 3339 timestamp used for `createdAt` / `updatedAt` columns.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
