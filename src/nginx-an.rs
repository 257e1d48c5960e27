use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use nginx_analyzer::chunk::{CHUNK_OVERLAP, CHUNK_SIZE};
use nginx_analyzer::export::save_json;
use nginx_analyzer::logging::init_logging;
use nginx_analyzer::report::write_report;
use nginx_analyzer::{analyze, AnalyzeOptions, GroupBy, Order, ViewMode};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nginx-an", version, about = "Nginx access log analyzer")]
struct Args {
    /// Path to the access log
    path: PathBuf,

    /// Sort in descending order (default)
    #[arg(long, conflicts_with = "asc")]
    desc: bool,

    /// Sort in ascending order
    #[arg(long)]
    asc: bool,

    /// Limit the number of results
    #[arg(long, default_value_t = 10, value_parser = parse_top)]
    top: usize,

    /// Group dates by
    #[arg(long, value_enum, default_value_t = DatesBy::None)]
    dates_by: DatesBy,

    /// JSON output file name
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads (defaults to the number of cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Nominal chunk size in bytes
    #[arg(long, default_value_t = CHUNK_SIZE)]
    chunk_size: u64,

    /// Read chunks instead of memory-mapping them
    #[arg(long)]
    no_mmap: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DatesBy {
    None,
    Hour,
    Day,
}

impl From<DatesBy> for GroupBy {
    fn from(value: DatesBy) -> Self {
        match value {
            DatesBy::None => GroupBy::None,
            DatesBy::Hour => GroupBy::Hour,
            DatesBy::Day => GroupBy::Day,
        }
    }
}

fn parse_top(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("top must be greater than 0".to_owned()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Args {
    fn options(&self) -> AnalyzeOptions {
        // --desc is the default; clap rejects it together with --asc
        let order = if self.asc && !self.desc {
            Order::Ascending
        } else {
            Order::Descending
        };
        let view = if self.no_mmap {
            ViewMode::Buffered
        } else {
            ViewMode::Auto
        };

        let mut options = AnalyzeOptions::default()
            .with_top_n(self.top)
            .with_order(order)
            .with_group_by(self.dates_by.into())
            .with_chunking(self.chunk_size, CHUNK_OVERLAP.min(self.chunk_size))
            .with_view(view);
        if let Some(workers) = self.workers {
            options = options.with_workers(workers);
        }
        options
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let analysis = analyze(&args.path, &args.options())
        .with_context(|| format!("failed to analyze {}", args.path.display()))?;

    let mut out = io::stdout().lock();
    write_report(&mut out, &analysis).context("failed to print report")?;
    out.flush()?;

    if let Some(output) = &args.output {
        save_json(output, &analysis)
            .with_context(|| format!("failed to save {}", output.display()))?;
    }

    Ok(())
}
