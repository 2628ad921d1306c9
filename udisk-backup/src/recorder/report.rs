//! Plain-text run report.

use super::summary::{ExtendedMetadata, RunSummary};
use crate::transfer::progress::{format_bytes, format_duration, format_signed_bytes};
use std::fmt::Write;

const RULE: &str = "------------------------------------------------------------";

/// Render the human-readable report stored next to a summary.
///
/// Sections: identity, timing, paths, disk space, transfer statistics and,
/// when measured, incremental savings.
pub fn render_report(summary: &RunSummary, extended: &ExtendedMetadata) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, summary, extended);
    out
}

fn write_report(
    out: &mut String,
    summary: &RunSummary,
    extended: &ExtendedMetadata,
) -> std::fmt::Result {
    writeln!(out, "USB Backup Report")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Operation:   {}", summary.operation_id)?;
    writeln!(out, "Type:        {}", extended.backup_type)?;
    writeln!(
        out,
        "Result:      {} (exit code {})",
        if summary.success { "SUCCESS" } else { "FAILED" },
        summary.exit_code
    )?;
    writeln!(out)?;

    writeln!(out, "Timing")?;
    writeln!(out, "  Started:   {}", summary.started_at.to_rfc3339())?;
    writeln!(out, "  Finished:  {}", summary.ended_at.to_rfc3339())?;
    writeln!(
        out,
        "  Duration:  {} ({:.1}s)",
        format_duration(summary.duration_seconds.max(0.0) as u64),
        summary.duration_seconds
    )?;
    writeln!(out)?;

    writeln!(out, "Paths")?;
    writeln!(out, "  Source:    {}", summary.source.display())?;
    writeln!(out, "  Target:    {}", summary.target.display())?;
    writeln!(out, "  Deleted:   {}", summary.deleted_dir.display())?;
    if let Some(baseline) = &extended.baseline {
        writeln!(out, "  Baseline:  {}", baseline.display())?;
    }
    writeln!(out)?;

    writeln!(out, "Disk space")?;
    writeln!(out, "  Free before: {}", optional_bytes(summary.free_bytes_before))?;
    writeln!(out, "  Free after:  {}", optional_bytes(summary.free_bytes_after))?;
    if let Some(delta) = summary.free_bytes_delta() {
        writeln!(out, "  Change:      {}", format_signed_bytes(delta))?;
    }
    writeln!(out)?;

    let files = &summary.file_counts;
    let bytes = &summary.byte_counts;
    writeln!(out, "Transfer statistics")?;
    writeln!(out, "  Files:             {} ({} directories)", files.total, files.dirs)?;
    writeln!(out, "  Created:           {}", files.created)?;
    writeln!(out, "  Transferred:       {}", files.transferred)?;
    writeln!(out, "  Deleted:           {}", files.deleted)?;
    writeln!(out, "  Total size:        {}", format_bytes(bytes.total_file_size))?;
    writeln!(out, "  Transferred size:  {}", format_bytes(bytes.total_transferred))?;
    writeln!(out, "  Literal data:      {}", format_bytes(bytes.literal_data))?;
    writeln!(out, "  Matched data:      {}", format_bytes(bytes.matched_data))?;
    writeln!(out, "  File list size:    {}", format_bytes(bytes.file_list_size))?;
    writeln!(out, "  Bytes sent:        {}", format_bytes(bytes.bytes_sent))?;
    writeln!(out, "  Bytes received:    {}", format_bytes(bytes.bytes_received))?;

    if let Some(savings) = &extended.savings {
        writeln!(out)?;
        writeln!(out, "Incremental savings")?;
        writeln!(
            out,
            "  Reused files:  {} of {} ({})",
            savings.linked_files,
            savings.total_files,
            format_bytes(savings.linked_bytes)
        )?;
        writeln!(
            out,
            "  New files:     {} ({})",
            savings.new_files,
            format_bytes(savings.new_bytes)
        )?;
        writeln!(out, "  Reuse ratio:   {:.1}%", savings.reuse_percent())?;
    }

    Ok(())
}

fn optional_bytes(value: Option<u64>) -> String {
    value.map(format_bytes).unwrap_or_else(|| "unknown".to_string())
}
