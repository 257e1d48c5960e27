use crate::chunk::{plan_chunks, CHUNK_OVERLAP, CHUNK_SIZE};
use crate::error::AnalyzeError;
use crate::merge::{merge, Analysis, MergeParams};
use crate::pool::{self, PoolConfig};
use crate::processor::GroupBy;
use crate::topk::Order;
use crate::view::ViewMode;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Instant;

/// Knobs for one run. `Default` matches the command-line defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    pub top_n: usize,
    pub order: Order,
    pub group_by: GroupBy,
    pub chunk_size: u64,
    pub overlap: u64,
    /// `None` uses one worker per available core.
    pub workers: Option<usize>,
    pub view: ViewMode,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            top_n: 10,
            order: Order::Descending,
            group_by: GroupBy::None,
            chunk_size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
            workers: None,
            view: ViewMode::Auto,
        }
    }
}

impl AnalyzeOptions {
    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: u64, overlap: u64) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: ViewMode) -> Self {
        self.view = view;
        self
    }

    pub fn validate(&self) -> Result<(), AnalyzeError> {
        if self.top_n == 0 {
            return Err(AnalyzeError::InvalidOptions("top must be greater than 0"));
        }
        if self.chunk_size == 0 {
            return Err(AnalyzeError::InvalidOptions("chunk size must be greater than 0"));
        }
        if self.overlap == 0 || self.overlap > self.chunk_size {
            return Err(AnalyzeError::InvalidOptions(
                "overlap must be between 1 and the chunk size",
            ));
        }
        if self.workers == Some(0) {
            return Err(AnalyzeError::InvalidOptions("workers must be greater than 0"));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        })
    }
}

/// Computes the statistics of the access log at `path`.
///
/// Only failures to open or inspect the file abort the run. Unparsable
/// lines are counted in `parse_errors`, and chunks that cannot be read are
/// listed in `failed_chunks`.
pub fn analyze(path: impl AsRef<Path>, options: &AnalyzeOptions) -> Result<Analysis, AnalyzeError> {
    options.validate()?;
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| AnalyzeError::open(path, e))?;
    let meta = file.metadata().map_err(|e| AnalyzeError::metadata(path, e))?;
    if !meta.is_file() {
        return Err(AnalyzeError::NotAFile(path.to_path_buf()));
    }
    drop(file);

    let started = Instant::now();
    let file_size = meta.len();
    let ranges = plan_chunks(file_size, options.chunk_size, options.overlap);
    let chunks = ranges.len();
    let workers = options.worker_count();
    tracing::debug!(path = %path.display(), file_size, chunks, workers, "starting analysis");

    let config = PoolConfig {
        workers,
        group_by: options.group_by,
        view: options.view,
    };
    let outcomes = pool::run(path, ranges, &config)?;

    let params = MergeParams {
        top_n: options.top_n,
        order: options.order,
        file_size,
        chunks,
    };
    let analysis = merge(outcomes, &params);

    tracing::info!(
        requests = analysis.total_requests,
        parse_errors = analysis.processing_stats.parse_errors,
        failed_chunks = analysis.processing_stats.failed_chunks.len(),
        elapsed = ?started.elapsed(),
        "analysis finished"
    );
    Ok(analysis)
}

/// `analyze` with the default chunking and one worker per core.
pub fn analyze_file(
    path: impl AsRef<Path>,
    top_n: usize,
    descending: bool,
    group_by: GroupBy,
) -> Result<Analysis, AnalyzeError> {
    let order = if descending {
        Order::Descending
    } else {
        Order::Ascending
    };
    let options = AnalyzeOptions::default()
        .with_top_n(top_n)
        .with_order(order)
        .with_group_by(group_by);
    analyze(path, &options)
}
