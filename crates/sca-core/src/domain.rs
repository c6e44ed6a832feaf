use std::{cmp::Ordering, fmt, sync::OnceLock};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Channel to archive, as listed in the configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Channel {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Workspace member as returned by `users.info`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub real_name: String,
    pub handle: String,
}

impl User {
    /// Best human-readable name: display name, then real name, then handle.
    pub fn preferred_name(&self) -> Option<&str> {
        [&self.display_name, &self.real_name, &self.handle]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// Name written for an author id that could not be resolved at all.
pub fn placeholder_name(user_id: &str) -> String {
    format!("User-{user_id}")
}

/// A single channel message.
///
/// Field names follow the Slack wire format so the record deserializes straight
/// from a history/replies page. Everything not listed here is derived on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: Option<u32>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    /// Filled in by the API client before the message is handed out.
    #[serde(skip)]
    pub user_display_name: Option<String>,
}

impl Message {
    pub fn thread_id(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn is_root(&self) -> bool {
        match self.thread_ts.as_deref() {
            None => true,
            Some(t) => t == self.ts,
        }
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0
    }

    /// Whole-second UTC time of the message.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let (secs, _) = split_ts(&self.ts)?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`, truncated to whole seconds.
    pub fn ts_iso(&self) -> Option<String> {
        self.datetime()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    pub fn month(&self) -> Option<MonthKey> {
        self.datetime().map(MonthKey::of)
    }

    /// User ids referenced as `<@ID>` in the text, in order of appearance.
    pub fn mentions(&self) -> Option<Vec<String>> {
        static MENTION_RE: OnceLock<Regex> = OnceLock::new();
        if self.text.is_empty() {
            return None;
        }
        let re = MENTION_RE.get_or_init(|| Regex::new(r"<@([A-Z0-9]+)>").expect("valid regex"));
        let ids: Vec<String> = re
            .captures_iter(&self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    pub fn message_type(&self) -> &str {
        match self.subtype.as_deref() {
            Some("channel_join") => "member_joined_channel",
            Some("channel_leave") => "member_left_channel",
            Some(s) if !s.is_empty() => s,
            _ => "message",
        }
    }
}

/// Split a `secs.fraction` timestamp into numeric parts.
///
/// The fraction is normalized to microseconds so `"1.5"` and `"1.500000"` compare equal.
fn split_ts(ts: &str) -> Option<(i64, u64)> {
    let (secs, frac) = match ts.split_once('.') {
        Some((s, f)) => (s, f),
        None => (ts, ""),
    };
    let secs = secs.trim().parse::<i64>().ok()?;
    let mut micros = 0u64;
    for (i, c) in frac.chars().take(6).enumerate() {
        let d = c.to_digit(10)? as u64;
        micros += d * 10u64.pow(5 - i as u32);
    }
    Some((secs, micros))
}

/// Numeric ordering of two platform timestamps. Unparseable values sort last,
/// lexicographically among themselves.
pub fn compare_ts(a: &str, b: &str) -> Ordering {
    match (split_ts(a), split_ts(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort ascending by timestamp and collapse repeated timestamps (first wins).
pub fn sort_and_dedup(messages: &mut Vec<Message>) {
    messages.sort_by(|a, b| compare_ts(&a.ts, &b.ts));
    messages.dedup_by(|later, earlier| compare_ts(&later.ts, &earlier.ts) == Ordering::Equal);
}

/// Calendar month bucket (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive time range for a history fetch. `None` means unbounded on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// From 00:00:00 of `from` through the last microsecond of `to` (UTC days).
    pub fn from_dates(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from: from.map(start_of_day),
            to: to.map(end_of_day),
        }
    }

    /// The whole UTC day `day`.
    pub fn day(day: NaiveDate) -> Self {
        Self::from_dates(Some(day), Some(day))
    }

    /// The `days` calendar days ending with (and including) `today`.
    pub fn trailing_days(today: NaiveDate, days: u32) -> Self {
        let start = today - ChronoDuration::days(i64::from(days.saturating_sub(1)));
        Self::from_dates(Some(start), Some(today))
    }
}

fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn end_of_day(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_hms_micro_opt(23, 59, 59, 999_999).unwrap_or_default())
}

/// Slack-style `secs.micros` rendering of a bound, used for `oldest`/`latest`.
pub fn to_platform_ts(dt: DateTime<Utc>) -> String {
    format!("{}.{:06}", dt.timestamp(), dt.timestamp_subsec_micros())
}
