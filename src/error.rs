use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fields of a combined-log line, in the order they are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Address,
    User,
    Method,
    Path,
    Protocol,
    Referrer,
    UserAgent,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Address => "address",
            Field::User => "user",
            Field::Method => "method",
            Field::Path => "path",
            Field::Protocol => "protocol",
            Field::Referrer => "referrer",
            Field::UserAgent => "user agent",
        };
        f.write_str(name)
    }
}

/// Why a single line was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{0} is empty")]
    FieldMissing(Field),

    #[error("invalid address '{0}'")]
    AddressInvalid(String),

    #[error("invalid date '{0}'")]
    DateInvalid(String),

    #[error("invalid status code '{0}'")]
    StatusInvalid(String),

    #[error("invalid response size '{0}'")]
    SizeInvalid(String),

    #[error("line is not terminated inside its chunk")]
    Truncated,
}

/// A chunk that could not be processed at all.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("no line terminator in chunk {index} ({start}..{end})")]
    MissingLineTerminator { index: usize, start: u64, end: u64 },

    #[error("failed to read chunk {index} ({start}..{end}): {source}")]
    Io {
        index: usize,
        start: u64,
        end: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Failures that stop a run before any statistics are produced.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stat {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AnalyzeError {
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    pub fn metadata(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Metadata {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
