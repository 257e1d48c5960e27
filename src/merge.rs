use crate::entry::{TimeRange, Timestamp};
use crate::error::ChunkError;
use crate::processor::PartialAggregate;
use crate::topk::{Hits, Order, TopK};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::net::IpAddr;

/// Final statistics of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub ips: Vec<Hits<IpAddr>>,
    pub codes: Vec<Hits<u16>>,
    pub dates: Vec<Hits<Timestamp>>,

    pub total_requests: u64,
    pub unique_ips: u64,
    pub unique_user_agents: u64,

    /// `None` when the file held no valid line.
    pub time_range: Option<TimeRange>,

    pub processing_stats: ProcessingStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub file_size: u64,
    pub parse_errors: u64,
    pub chunks: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

/// A chunk whose lines are missing from the statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub reason: String,
}

impl From<&ChunkError> for ChunkFailure {
    fn from(err: &ChunkError) -> Self {
        let (index, start, end) = match *err {
            ChunkError::MissingLineTerminator { index, start, end }
            | ChunkError::Io {
                index, start, end, ..
            } => (index, start, end),
        };
        ChunkFailure {
            index,
            start,
            end,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeParams {
    pub top_n: usize,
    pub order: Order,
    pub file_size: u64,
    pub chunks: usize,
}

/// Folds every chunk outcome into one `Analysis`.
///
/// Counts for the same key are summed across chunks before ranking, and
/// unique counts come from the full per-chunk key sets. The result does not
/// depend on the order outcomes arrive in.
pub fn merge<I>(outcomes: I, params: &MergeParams) -> Analysis
where
    I: IntoIterator<Item = Result<PartialAggregate, ChunkError>>,
{
    let mut total = PartialAggregate::default();
    let mut failed_chunks = Vec::new();

    for outcome in outcomes {
        match outcome {
            Ok(partial) => total.merge(partial),
            Err(err) => {
                tracing::warn!(error = %err, "chunk skipped");
                failed_chunks.push(ChunkFailure::from(&err));
            }
        }
    }
    failed_chunks.sort_by_key(|f| f.index);

    let unique_ips = total.addresses.len() as u64;
    let unique_user_agents = total.user_agents.len() as u64;

    Analysis {
        ips: rank(total.addresses, params.top_n, params.order),
        codes: rank(total.status_codes, params.top_n, params.order),
        dates: rank(total.dates, params.top_n, params.order)
            .into_iter()
            .map(|h| Hits {
                key: h.key.0,
                hits: h.hits,
            })
            .collect(),
        total_requests: total.requests,
        unique_ips,
        unique_user_agents,
        time_range: total.time_range,
        processing_stats: ProcessingStats {
            file_size: params.file_size,
            parse_errors: total.parse_errors,
            chunks: params.chunks,
            failed_chunks,
        },
    }
}

fn rank<K>(counts: HashMap<K, u64>, n: usize, order: Order) -> Vec<Hits<K>>
where
    K: Ord + Hash + Clone,
{
    let mut heap = TopK::with_capacity(order, counts.len());
    heap.extend(counts);
    heap.top_n(n)
}
