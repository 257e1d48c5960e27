use crate::chunk::ByteRange;
use crate::error::{AnalyzeError, ChunkError};
use crate::processor::{process_chunk, GroupBy, PartialAggregate};
use crate::view::ViewMode;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io;
use std::path::Path;

pub type ChunkOutcome = Result<PartialAggregate, ChunkError>;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub group_by: GroupBy,
    pub view: ViewMode,
}

/// Processes every range of `path` on `config.workers` threads.
///
/// Ranges are handed out through one queue and outcomes collected through
/// another; workers share nothing else. Returns once every worker has
/// finished, with the outcome queue closed and holding one entry per range.
pub fn run(
    path: &Path,
    ranges: Vec<ByteRange>,
    config: &PoolConfig,
) -> Result<Receiver<ChunkOutcome>, AnalyzeError> {
    let capacity = ranges.len().max(1);
    let workers = config.workers.clamp(1, capacity);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("chunk-worker-{i}"))
        .build()?;

    // sized to hold every item, so neither side ever blocks on a full queue
    let (range_tx, range_rx) = bounded::<ByteRange>(capacity);
    let (result_tx, result_rx) = bounded::<ChunkOutcome>(capacity);

    for range in ranges {
        // the receiving side is held right here, so the queue cannot be disconnected
        let _ = range_tx.send(range);
    }
    drop(range_tx);

    pool.scope(|s| {
        for id in 0..workers {
            let ranges = range_rx.clone();
            let results = result_tx.clone();
            s.spawn(move |_| worker(id, path, &ranges, &results, config));
        }
    });
    drop(result_tx);

    Ok(result_rx)
}

fn worker(
    id: usize,
    path: &Path,
    ranges: &Receiver<ByteRange>,
    results: &Sender<ChunkOutcome>,
    config: &PoolConfig,
) {
    let file = File::open(path);
    if let Err(e) = &file {
        tracing::warn!(worker = id, error = %e, "worker could not open input");
    }

    let mut processed = 0usize;
    while let Ok(range) = ranges.recv() {
        let outcome = match &file {
            Ok(file) => process_chunk(file, &range, config.group_by, config.view),
            Err(e) => Err(ChunkError::Io {
                index: range.index,
                start: range.start,
                end: range.end,
                source: io::Error::new(e.kind(), e.to_string()),
            }),
        };
        processed += 1;

        if results.send(outcome).is_err() {
            break;
        }
    }

    tracing::debug!(worker = id, chunks = processed, "worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::plan_chunks;
    use std::io::Write;

    const LINE: &str = r#"10.0.0.1 - - [25/Dec/2023:10:30:45 +0000] "GET / HTTP/1.1" 200 1 "-" "ua""#;

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            group_by: GroupBy::None,
            view: ViewMode::Auto,
        }
    }

    #[test]
    fn test_one_outcome_per_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..200 {
            writeln!(file, "{LINE}").unwrap();
        }
        file.flush().unwrap();
        let size = file.as_file().metadata().unwrap().len();

        for workers in [1, 2, 4, 16] {
            let ranges = plan_chunks(size, 1000, 200);
            let count = ranges.len();
            let outcomes: Vec<_> = run(file.path(), ranges, &config(workers))
                .unwrap()
                .into_iter()
                .collect();
            assert_eq!(outcomes.len(), count);

            let mut indexes: Vec<_> = outcomes
                .iter()
                .map(|o| o.as_ref().unwrap().index)
                .collect();
            indexes.sort_unstable();
            assert_eq!(indexes, (0..count).collect::<Vec<_>>());

            let requests: u64 = outcomes.iter().map(|o| o.as_ref().unwrap().requests).sum();
            assert_eq!(requests, 200);
        }
    }

    #[test]
    fn test_unreadable_input_fails_each_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.log");
        let ranges = plan_chunks(5000, 1000, 10);

        let outcomes: Vec<_> = run(&missing, ranges, &config(2)).unwrap().into_iter().collect();
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, Err(ChunkError::Io { .. }))));
    }
}
