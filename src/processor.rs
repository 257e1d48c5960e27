use crate::chunk::ByteRange;
use crate::entry::{parse_line, DateKey, LogEntry, TimeRange, Timestamp};
use crate::error::{ChunkError, ParseError};
use crate::view::{ByteView, ViewMode};
use chrono::Timelike;
use memchr::{memchr, memchr_iter, Memchr};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::net::IpAddr;

const AVG_LINE_SIZE: usize = 400;

/// Granularity of the date histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Exact timestamp.
    #[default]
    None,
    Hour,
    Day,
}

impl GroupBy {
    /// Truncates `ts` in its own offset.
    pub fn bucket(self, ts: Timestamp) -> Timestamp {
        let truncated = match self {
            GroupBy::None => return ts,
            GroupBy::Hour => ts.with_minute(0),
            GroupBy::Day => ts.with_hour(0).and_then(|t| t.with_minute(0)),
        };
        // fixed offsets have no gaps, so the with_* calls never fail
        truncated
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(ts)
    }
}

/// One line of a chunk. `start` is relative to the chunk's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub start: usize,
    pub bytes: &'a [u8],
    pub terminated: bool,
}

/// Single forward pass over the `\n`-separated lines of a buffer.
///
/// The final line is yielded even without a terminator; a trailing `\n`
/// does not produce an empty line after it.
pub struct Lines<'a> {
    data: &'a [u8],
    base: usize,
    newlines: Memchr<'a>,
    pos: usize,
}

impl<'a> Lines<'a> {
    pub fn new(data: &'a [u8]) -> Lines<'a> {
        Lines::starting_at(data, 0)
    }

    pub fn starting_at(data: &'a [u8], pos: usize) -> Lines<'a> {
        let pos = pos.min(data.len());
        Lines {
            data,
            base: pos,
            newlines: memchr_iter(b'\n', &data[pos..]),
            pos,
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Line<'a>> {
        let start = self.pos;
        match self.newlines.next() {
            Some(x) => {
                let end = self.base + x;
                self.pos = end + 1;
                Some(Line {
                    start,
                    bytes: &self.data[start..end],
                    terminated: true,
                })
            }
            None if start < self.data.len() => {
                self.pos = self.data.len();
                Some(Line {
                    start,
                    bytes: &self.data[start..],
                    terminated: false,
                })
            }
            None => None,
        }
    }
}

/// Everything one chunk contributes to the final statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialAggregate {
    pub index: usize,
    pub addresses: HashMap<IpAddr, u64>,
    pub status_codes: HashMap<u16, u64>,
    pub dates: HashMap<DateKey, u64>,
    pub user_agents: HashSet<String>,
    pub time_range: Option<TimeRange>,
    pub requests: u64,
    pub parse_errors: u64,
}

impl PartialAggregate {
    pub fn new(index: usize) -> PartialAggregate {
        PartialAggregate {
            index,
            ..Default::default()
        }
    }

    fn with_capacity(index: usize, lines: usize) -> PartialAggregate {
        // address cardinality is far below line count in real logs
        let keys = (lines / 16).max(8);
        PartialAggregate {
            index,
            addresses: HashMap::with_capacity_and_hasher(keys, Default::default()),
            user_agents: HashSet::with_capacity_and_hasher(keys, Default::default()),
            ..Default::default()
        }
    }

    pub fn record(&mut self, entry: &LogEntry<'_>, group_by: GroupBy) {
        self.requests += 1;
        *self.addresses.entry(entry.address).or_default() += 1;
        *self.status_codes.entry(entry.status).or_default() += 1;
        *self
            .dates
            .entry(DateKey(group_by.bucket(entry.timestamp)))
            .or_default() += 1;

        if !self.user_agents.contains(entry.user_agent) {
            self.user_agents.insert(entry.user_agent.to_owned());
        }

        match &mut self.time_range {
            Some(range) => range.extend(entry.timestamp),
            None => self.time_range = Some(TimeRange::at(entry.timestamp)),
        }
    }

    #[inline]
    pub fn record_error(&mut self, error: &ParseError) {
        tracing::trace!(chunk = self.index, %error, "discarding line");
        self.parse_errors += 1;
    }

    /// Folds `other` into `self`. Commutative and associative over chunks;
    /// `index` keeps the lowest chunk index seen.
    pub fn merge(&mut self, other: PartialAggregate) {
        self.index = self.index.min(other.index);
        self.requests += other.requests;
        self.parse_errors += other.parse_errors;

        merge_counts(&mut self.addresses, other.addresses);
        merge_counts(&mut self.status_codes, other.status_codes);
        merge_counts(&mut self.dates, other.dates);

        if self.user_agents.len() < other.user_agents.len() {
            let mine = std::mem::replace(&mut self.user_agents, other.user_agents);
            self.user_agents.extend(mine);
        } else {
            self.user_agents.extend(other.user_agents);
        }

        self.time_range = match (self.time_range, other.time_range) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        };
    }
}

fn merge_counts<K: std::hash::Hash + Eq>(into: &mut HashMap<K, u64>, from: HashMap<K, u64>) {
    for (key, count) in from {
        *into.entry(key).or_default() += count;
    }
}

/// Reads `range` from `file` and aggregates the lines that belong to it.
pub fn process_chunk(
    file: &File,
    range: &ByteRange,
    group_by: GroupBy,
    mode: ViewMode,
) -> Result<PartialAggregate, ChunkError> {
    let view = ByteView::open(file, range, mode).map_err(|source| ChunkError::Io {
        index: range.index,
        start: range.start,
        end: range.end,
        source,
    })?;
    let partial = process_bytes(&view, range, group_by)?;
    drop(view);
    Ok(partial)
}

/// Aggregates the lines of `data`, which holds exactly the bytes of `range`.
///
/// Only lines whose first byte falls in the nominal interval are counted;
/// lines starting in the leading overlap were counted by the previous chunk
/// and lines starting in the trailing overlap belong to the next one.
pub fn process_bytes(
    data: &[u8],
    range: &ByteRange,
    group_by: GroupBy,
) -> Result<PartialAggregate, ChunkError> {
    let mut partial = PartialAggregate::with_capacity(range.index, data.len() / AVG_LINE_SIZE);
    if data.is_empty() {
        return Ok(partial);
    }

    // both are within data: start <= nominal_start <= nominal_end <= end
    let owned_from = offset(range.nominal_start - range.start);
    let owned_to = offset(range.nominal_end - range.start);

    let first = if range.start == 0 {
        0
    } else {
        // the leading line is partial or was counted by the previous chunk
        match memchr(b'\n', data) {
            Some(x) => x + 1,
            None => {
                return Err(ChunkError::MissingLineTerminator {
                    index: range.index,
                    start: range.start,
                    end: range.end,
                })
            }
        }
    };

    for line in Lines::starting_at(data, first) {
        if line.start >= owned_to {
            break;
        }
        if line.start < owned_from {
            continue;
        }
        if !line.terminated && !range.reaches_eof {
            partial.record_error(&ParseError::Truncated);
            continue;
        }

        // raw bytes in; stray invalid sequences become U+FFFD
        let text = String::from_utf8_lossy(line.bytes);
        match parse_line(&text) {
            Ok(entry) => partial.record(&entry, group_by),
            Err(e) => partial.record_error(&e),
        }
    }

    tracing::debug!(
        chunk = range.index,
        requests = partial.requests,
        parse_errors = partial.parse_errors,
        "chunk processed"
    );
    Ok(partial)
}

#[inline]
fn offset(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::plan_chunks;
    use crate::entry::parse_timestamp;

    const GOOD: &str = r#"192.168.1.100 - - [25/Dec/2023:10:30:45 +0000] "GET /api/users HTTP/1.1" 200 1234 "https://example.com" "Mozilla/5.0""#;

    fn whole(data: &[u8]) -> ByteRange {
        plan_chunks(data.len() as u64, u64::MAX, 0)[0]
    }

    fn line_with(ip: &str, status: u16, ua: &str) -> String {
        GOOD.replace("192.168.1.100", ip)
            .replace(" 200 ", &format!(" {status} "))
            .replace("Mozilla/5.0", ua)
    }

    #[test]
    fn test_lines_terminated_and_tail() {
        let data = b"ab\ncd\nef";
        let lines: Vec<_> = Lines::new(data).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!((lines[0].start, lines[0].bytes, lines[0].terminated), (0, &b"ab"[..], true));
        assert_eq!((lines[1].start, lines[1].bytes, lines[1].terminated), (3, &b"cd"[..], true));
        assert_eq!((lines[2].start, lines[2].bytes, lines[2].terminated), (6, &b"ef"[..], false));
    }

    #[test]
    fn test_lines_trailing_newline() {
        let lines: Vec<_> = Lines::new(b"ab\n").collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].terminated);
    }

    #[test]
    fn test_lines_blank_lines() {
        let lines: Vec<_> = Lines::new(b"\n\nx").map(|l| l.bytes).collect();
        assert_eq!(lines, vec![&b""[..], &b""[..], &b"x"[..]]);
    }

    #[test]
    fn test_lines_starting_at() {
        let lines: Vec<_> = Lines::starting_at(b"ab\ncd\nef\n", 3).map(|l| l.start).collect();
        assert_eq!(lines, vec![3, 6]);
        assert_eq!(Lines::starting_at(b"ab", 10).count(), 0);
    }

    #[test]
    fn test_group_by_bucket() {
        let ts = parse_timestamp("25/Dec/2023:10:30:45 +0300").unwrap();
        assert_eq!(GroupBy::None.bucket(ts), ts);
        assert_eq!(
            GroupBy::Hour.bucket(ts),
            parse_timestamp("25/Dec/2023:10:00:00 +0300").unwrap()
        );
        let day = GroupBy::Day.bucket(ts);
        assert_eq!(day, parse_timestamp("25/Dec/2023:00:00:00 +0300").unwrap());
        assert_eq!(day.offset(), ts.offset());
    }

    #[test]
    fn test_process_counts() {
        let text = [
            line_with("10.0.0.1", 200, "A"),
            line_with("10.0.0.2", 404, "B"),
            "garbage".to_owned(),
            line_with("10.0.0.1", 200, "A"),
        ]
        .join("\n");
        let data = text.as_bytes();

        let partial = process_bytes(data, &whole(data), GroupBy::Hour).unwrap();
        assert_eq!(partial.requests, 3);
        assert_eq!(partial.parse_errors, 1);
        assert_eq!(partial.addresses[&"10.0.0.1".parse::<IpAddr>().unwrap()], 2);
        assert_eq!(partial.status_codes[&200], 2);
        assert_eq!(partial.status_codes[&404], 1);
        assert_eq!(partial.dates.len(), 1);
        assert_eq!(partial.user_agents.len(), 2);
        assert!(partial.user_agents.contains("\"A\""));
        let range = partial.time_range.unwrap();
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_process_empty() {
        let partial = process_bytes(b"", &whole(b""), GroupBy::None).unwrap();
        assert_eq!(partial, PartialAggregate::new(0));
        assert!(partial.time_range.is_none());
    }

    #[test]
    fn test_missing_terminator_fails_chunk() {
        let data = vec![b'x'; 100];
        let range = plan_chunks(100, 40, 10)[1];
        let view = &data[range.start as usize..range.end as usize];
        assert!(matches!(
            process_bytes(view, &range, GroupBy::None),
            Err(ChunkError::MissingLineTerminator { index: 1, .. })
        ));
    }

    #[test]
    fn test_each_line_counted_once() {
        let lines: Vec<String> = (0..40)
            .map(|i| line_with(&format!("10.0.{}.{}", i / 8, i % 8), 200, "A"))
            .collect();
        let text = lines.join("\n") + "\n";
        let data = text.as_bytes();
        let line_len = lines[0].len() as u64 + 1;

        for chunk_size in [line_len - 1, line_len, line_len + 1, 2 * line_len, 333, 1000, 4099] {
            let mut total = PartialAggregate::default();
            for range in plan_chunks(data.len() as u64, chunk_size, line_len + 8) {
                let view = &data[range.start as usize..range.end as usize];
                total.merge(process_bytes(view, &range, GroupBy::None).unwrap());
            }
            assert_eq!(total.requests, 40, "chunk size {chunk_size}");
            assert_eq!(total.parse_errors, 0, "chunk size {chunk_size}");
            assert_eq!(total.addresses.len(), 40);
            assert!(total.addresses.values().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_line_longer_than_overlap_is_truncated() {
        let long = line_with("10.0.0.9", 200, &"L".repeat(200));
        let text = format!("{}\n{}\n{}\n", line_with("10.0.0.1", 200, "A"), long, line_with("10.0.0.2", 200, "A"));
        let data = text.as_bytes();
        let first_len = text.find('\n').unwrap() as u64 + 1;

        // the long line starts inside chunk 0 and ends far past its overlap
        let mut total = PartialAggregate::default();
        for range in plan_chunks(data.len() as u64, first_len + 10, 5) {
            let view = &data[range.start as usize..range.end as usize];
            if let Ok(partial) = process_bytes(view, &range, GroupBy::None) {
                total.merge(partial);
            }
        }
        assert_eq!(total.requests, 2);
        assert_eq!(total.parse_errors, 1);
        assert!(!total.addresses.contains_key(&"10.0.0.9".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_invalid_utf8_in_user_agent_still_counts() {
        let mut data = GOOD.as_bytes().to_vec();
        let ua = GOOD.find("Mozilla").unwrap();
        data[ua] = 0xff;

        let partial = process_bytes(&data, &whole(&data), GroupBy::None).unwrap();
        assert_eq!(partial.requests, 1);
        assert_eq!(partial.parse_errors, 0);
        assert!(partial.user_agents.contains("\"\u{fffd}ozilla/5.0\""));
    }

    #[test]
    fn test_mixed_offsets_merge_in_any_order() {
        let utc = GOOD.to_owned();
        let plus2 = GOOD.replace("25/Dec/2023:10:30:45 +0000", "25/Dec/2023:12:30:45 +0200");
        let a = process_bytes(utc.as_bytes(), &whole(utc.as_bytes()), GroupBy::Hour).unwrap();
        let b = process_bytes(plus2.as_bytes(), &whole(plus2.as_bytes()), GroupBy::Hour).unwrap();

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        // same instant, two offsets: two buckets
        assert_eq!(ab.dates.len(), 2);
        let mut keys: Vec<String> = ab.dates.keys().map(|k| k.0.to_rfc3339()).collect();
        keys.sort();
        assert_eq!(keys, ["2023-12-25T10:00:00+00:00", "2023-12-25T12:00:00+02:00"]);
        assert_eq!(ab.dates, ba.dates);

        let (r1, r2) = (ab.time_range.unwrap(), ba.time_range.unwrap());
        assert_eq!(r1.start.to_rfc3339(), r2.start.to_rfc3339());
        assert_eq!(r1.end.to_rfc3339(), r2.end.to_rfc3339());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = process_bytes(GOOD.as_bytes(), &whole(GOOD.as_bytes()), GroupBy::None).unwrap();
        let other = line_with("10.0.0.7", 500, "B");
        let b = process_bytes(other.as_bytes(), &whole(other.as_bytes()), GroupBy::None).unwrap();

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.requests, 2);
        assert_eq!(ab.user_agents.len(), 2);
    }
}
