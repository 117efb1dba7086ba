//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::script::{self, ReplayReport, Script};
use anyhow::Context;
use kino_monitor::{to_milliseconds, BlockedSegments, MonitorConfig, TimeRange};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct RecordRow {
    tracker: String,
    seq: u64,
    timestamp_ms: i64,
    position: String,
    media: String,
    event: String,
}

/// Replay a session script
pub async fn replay(
    script_path: &Path,
    config_path: Option<&Path>,
    format: &str,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;
    let script = Script::from_json(&contents)
        .with_context(|| format!("parsing script {}", script_path.display()))?;

    let config = match config_path {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let report = script::run(&script, config).await;
    print_report(&report, OutputFormat::from(format))
}

fn print_report(report: &ReplayReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", output::to_json(report)?),
        OutputFormat::Table => {
            let rows = report.batches.iter().flat_map(|batch| {
                batch.records.iter().map(|record| RecordRow {
                    tracker: batch.tracker.clone(),
                    seq: record.sequence,
                    timestamp_ms: record.timestamp_ms,
                    position: output::opt(record.position),
                    media: output::opt(record.media_id.as_deref()),
                    event: record.event.kind().to_string(),
                })
            });
            println!("{}", output::table(rows));
            print_summary(report);
        }
        OutputFormat::Text => {
            for batch in &report.batches {
                for record in &batch.records {
                    println!(
                        "[{}] #{} {}ms pos={} {}",
                        batch.tracker,
                        record.sequence,
                        record.timestamp_ms,
                        output::opt(record.position),
                        serde_json::to_string(&record.event)?
                    );
                }
            }
            print_summary(report);
        }
    }
    Ok(())
}

fn print_summary(report: &ReplayReport) {
    println!("\nControl requests:");
    if report.control_requests.is_empty() {
        println!("  none");
    }
    for request in &report.control_requests {
        println!("  {:?}", request);
    }

    let d = &report.diagnostics;
    println!("\nDiagnostics:");
    println!("  Events recorded:      {}", d.events_recorded);
    println!("  Invalid-state drops:  {}", d.invalid_state_drops);
    println!("  Rejected metadata:    {}", d.malformed_metadata_rejections);
    println!("  Hand-off drops:       {}", d.handoff_drops);

    let s = &report.delivery;
    println!("\nDelivery:");
    println!(
        "  Delivered: {} records in {} batches",
        s.records_delivered, s.batches_delivered
    );
    println!(
        "  Dropped:   {} records in {} batches ({} retries)",
        s.records_dropped, s.batches_dropped, s.retries
    );

    if !report.failures.is_empty() {
        println!("\nFailed steps:");
        for failure in &report.failures {
            println!("  step {}: [{}] {}", failure.step, failure.code, failure.message);
        }
    }
}

/// Parse `start:end` pairs separated by commas
pub fn parse_ranges(input: &str) -> anyhow::Result<Vec<TimeRange>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> anyhow::Result<TimeRange> {
            let (start, end) = part
                .split_once(':')
                .with_context(|| format!("range '{}' is not start:end", part))?;
            Ok(TimeRange::new(
                start.trim().parse().with_context(|| format!("bad start in '{}'", part))?,
                end.trim().parse().with_context(|| format!("bad end in '{}'", part))?,
            ))
        })
        .collect()
}

#[derive(Serialize, Tabled)]
struct PositionRow {
    position: f64,
    blocked: bool,
    range: String,
}

/// Validate blocked segments and check positions against them
pub fn segments(ranges: &str, positions: &[f64], format: &str) -> anyhow::Result<()> {
    let segments = BlockedSegments::new(parse_ranges(ranges)?)?;

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|&position| {
            let hit = segments.find(position);
            PositionRow {
                position,
                blocked: hit.is_some(),
                range: output::opt(hit),
            }
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!(
            "{}",
            output::to_json(&serde_json::json!({
                "ranges": segments.ranges(),
                "blocked_seconds": segments.total_duration(),
                "positions": rows,
            }))?
        ),
        OutputFormat::Table => {
            println!(
                "{} ranges, {}s blocked",
                segments.len(),
                segments.total_duration()
            );
            println!("{}", output::table(rows));
        }
        OutputFormat::Text => {
            println!(
                "{} ranges, {}s blocked",
                segments.len(),
                segments.total_duration()
            );
            for row in rows {
                if row.blocked {
                    println!("  {:>10}  blocked by {}", row.position, row.range);
                } else {
                    println!("  {:>10}  unblocked", row.position);
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct MillisRow {
    seconds: f64,
    milliseconds: i64,
}

/// Print millisecond timestamps
pub fn millis(seconds: &[f64], format: &str) -> anyhow::Result<()> {
    let rows: Vec<MillisRow> = seconds
        .iter()
        .map(|&seconds| MillisRow {
            seconds,
            milliseconds: to_milliseconds(seconds),
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&rows)?),
        OutputFormat::Table => println!("{}", output::table(rows)),
        OutputFormat::Text => {
            for row in rows {
                println!("{} -> {}", row.seconds, row.milliseconds);
            }
        }
    }
    Ok(())
}
