//! Parallel statistics over large nginx "combined" access logs.
//!
//! The file is split into overlapping byte ranges, each range is
//! memory-mapped and scanned by a worker, and the per-chunk tallies are
//! merged into one [`Analysis`].

pub mod analyzer;
pub mod chunk;
pub mod entry;
pub mod error;
pub mod export;
pub mod logging;
pub mod merge;
pub mod pool;
pub mod processor;
pub mod report;
pub mod tokenizer;
pub mod topk;
pub mod view;

pub use analyzer::{analyze, analyze_file, AnalyzeOptions};
pub use entry::{parse_line, DateKey, LogEntry, TimeRange, Timestamp};
pub use error::{AnalyzeError, ChunkError, ExportError, Field, ParseError};
pub use merge::{Analysis, ChunkFailure, ProcessingStats};
pub use processor::GroupBy;
pub use topk::{Hits, Order, TopK};
pub use view::ViewMode;
