use crate::error::{Field, ParseError};
use crate::tokenizer::Words;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

pub type Timestamp = DateTime<FixedOffset>;

/// `25/Dec/2023:10:30:45 +0000`
const DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// A timestamp whose identity includes its UTC offset.
///
/// `DateTime` equality only looks at the instant, so `10:30 +0000` and
/// `12:30 +0200` would collapse into one key holding whichever offset was
/// seen first. Here they stay apart, and equal instants order by offset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(pub Timestamp);

impl DateKey {
    #[inline]
    fn parts(&self) -> (NaiveDateTime, i32) {
        (self.0.naive_utc(), self.0.offset().local_minus_utc())
    }
}

impl PartialEq for DateKey {
    fn eq(&self, other: &Self) -> bool {
        self.parts() == other.parts()
    }
}

impl Eq for DateKey {}

impl Hash for DateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts().hash(state);
    }
}

impl Ord for DateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts().cmp(&other.parts())
    }
}

impl PartialOrd for DateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Earliest and latest timestamp seen. Of two equal instants the one with
/// the smaller offset is the start and the larger one the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    #[inline]
    pub fn at(ts: Timestamp) -> TimeRange {
        TimeRange { start: ts, end: ts }
    }

    #[inline]
    pub fn extend(&mut self, ts: Timestamp) {
        *self = self.union(TimeRange::at(ts));
    }

    #[inline]
    pub fn union(self, other: TimeRange) -> TimeRange {
        TimeRange {
            start: DateKey(self.start).min(DateKey(other.start)).0,
            end: DateKey(self.end).max(DateKey(other.end)).0,
        }
    }
}

/// One request, borrowed from the line it was parsed from.
///
/// Quoted fields keep their quote characters: the request line arrives as
/// `"GET`, `/path`, `HTTP/1.1"` and the referrer and user agent as single
/// quoted words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub address: IpAddr,
    pub user: &'a str,
    pub timestamp: Timestamp,
    pub method: &'a str,
    pub path: &'a str,
    pub protocol: &'a str,
    pub status: u16,
    pub response_bytes: u64,
    pub referrer: &'a str,
    pub user_agent: &'a str,
}

/// Parses one combined-log line, failing on the first bad field.
pub fn parse_line(line: &str) -> Result<LogEntry<'_>, ParseError> {
    let mut words = Words::new(line);

    let address = words.next_or_empty();
    if address.is_empty() {
        return Err(ParseError::FieldMissing(Field::Address));
    }
    let address = address
        .parse::<IpAddr>()
        .map_err(|_| ParseError::AddressInvalid(address.to_owned()))?;

    // identity, always "-" in practice
    words.next_or_empty();

    let user = required(&mut words, Field::User)?;

    let date = format!("{} {}", words.next_or_empty(), words.next_or_empty());
    let timestamp = parse_timestamp(&date)?;

    let method = required(&mut words, Field::Method)?;
    let path = required(&mut words, Field::Path)?;
    let protocol = required(&mut words, Field::Protocol)?;

    let status = words.next_or_empty();
    let status = digits(status)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ParseError::StatusInvalid(status.to_owned()))?;

    let size = words.next_or_empty();
    let response_bytes = digits(size)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| ParseError::SizeInvalid(size.to_owned()))?;

    let referrer = required(&mut words, Field::Referrer)?;
    let user_agent = required(&mut words, Field::UserAgent)?;

    Ok(LogEntry {
        address,
        user,
        timestamp,
        method,
        path,
        protocol,
        status,
        response_bytes,
        referrer,
        user_agent,
    })
}

/// Parses `[25/Dec/2023:10:30:45 +0000]`; the brackets are optional.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, ParseError> {
    let trimmed = raw.strip_prefix('[').unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);

    DateTime::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| ParseError::DateInvalid(raw.to_owned()))
}

/// `word` if it is a non-empty run of ASCII digits. `str::parse` would
/// also take a leading `+`.
#[inline]
fn digits(word: &str) -> Option<&str> {
    (!word.is_empty() && word.bytes().all(|b| b.is_ascii_digit())).then_some(word)
}

#[inline]
fn required<'a>(words: &mut Words<'a>, field: Field) -> Result<&'a str, ParseError> {
    let word = words.next_or_empty();
    if word.is_empty() {
        Err(ParseError::FieldMissing(field))
    } else {
        Ok(word)
    }
}
