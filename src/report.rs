use crate::entry::Timestamp;
use crate::merge::{Analysis, ProcessingStats};
use crate::topk::Hits;
use std::fmt::Display;
use std::io::{self, Write};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes the human-readable report printed by `nginx-an`.
pub fn write_report<W: Write>(out: &mut W, analysis: &Analysis) -> io::Result<()> {
    write_summary(out, analysis)?;
    write_top(out, "Top ips", &analysis.ips, |ip| ip.to_string())?;
    write_top(out, "Top status codes", &analysis.codes, |code| code.to_string())?;
    write_top(out, "Top dates", &analysis.dates, format_time)?;
    write_processing_stats(out, &analysis.processing_stats)
}

fn write_summary<W: Write>(out: &mut W, analysis: &Analysis) -> io::Result<()> {
    heading(out, "SUMMARY")?;
    writeln!(out, "Total Requests: {}", analysis.total_requests)?;
    writeln!(out, "Unique IPs: {}", analysis.unique_ips)?;
    writeln!(out, "Unique User Agents: {}", analysis.unique_user_agents)?;
    match &analysis.time_range {
        Some(range) => writeln!(
            out,
            "Time Range: {} to {}",
            format_time(&range.start),
            format_time(&range.end)
        )?,
        None => writeln!(out, "Time Range: -")?,
    }
    writeln!(out)
}

fn write_top<W, K, F, S>(out: &mut W, title: &str, rows: &[Hits<K>], fmt_key: F) -> io::Result<()>
where
    W: Write,
    F: Fn(&K) -> S,
    S: Display,
{
    heading(out, title)?;
    for (i, row) in rows.iter().enumerate() {
        writeln!(out, "{} {}: {}", i + 1, fmt_key(&row.key), row.hits)?;
    }
    writeln!(out)
}

fn write_processing_stats<W: Write>(out: &mut W, stats: &ProcessingStats) -> io::Result<()> {
    heading(out, "PROCESSING STATISTICS")?;
    #[allow(clippy::cast_precision_loss)]
    let megabytes = stats.file_size as f64 / (1024.0 * 1024.0);
    writeln!(out, "File Size: {megabytes:.2} MB")?;
    writeln!(out, "Parse Errors: {}", stats.parse_errors)?;
    writeln!(out, "Chunks: {}", stats.chunks)?;
    if !stats.failed_chunks.is_empty() {
        writeln!(out, "Failed Chunks: {}", stats.failed_chunks.len())?;
        for failure in &stats.failed_chunks {
            writeln!(out, "  {}", failure.reason)?;
        }
    }
    writeln!(out)
}

fn heading<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.len()))
}

fn format_time(ts: &Timestamp) -> String {
    ts.format(TIME_FORMAT).to_string()
}
