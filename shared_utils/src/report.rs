//! Report Module
//!
//! End-of-run summary box for humans; the JSON form is just the serialized
//! [`RunSummary`].

use crate::pipeline::{RunSummary, FAILED_PREVIEW_LIMIT};
use crate::progress::format_duration;
use console::style;

pub fn print_summary_report(summary: &RunSummary, dry_run: bool) {
    let title = if dry_run {
        "📊 Downscale Dry Run Report"
    } else {
        "📊 Downscale Summary Report"
    };

    println!();
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║  {:<50}  ║", title);
    println!("╠══════════════════════════════════════════════════════╣");
    for (label, value) in count_rows(summary) {
        println!("║  {:<22}{:>10}                     ║", label, value);
    }
    println!("╠══════════════════════════════════════════════════════╣");
    println!(
        "║  ⏱️  Total Time:         {:>10}                     ║",
        format_duration(summary.elapsed)
    );
    println!("╚══════════════════════════════════════════════════════╝");

    if summary.cancelled {
        println!();
        println!(
            "{}",
            style("⏹️  Run cancelled, remaining files were not touched").yellow()
        );
    }

    if !summary.failures.is_empty() {
        println!();
        println!("{}", style("❌ Failed files:").red().bold());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (path, reason) in summary.failed_preview(FAILED_PREVIEW_LIMIT) {
            println!("   {} → {}", path.display(), style(reason).dim());
        }
        let hidden = summary.failures.len().saturating_sub(FAILED_PREVIEW_LIMIT);
        if hidden > 0 {
            println!("   ... and {} more", hidden);
        }
    }

    if let Some(log) = &summary.log_path {
        println!();
        println!("📝 Full log: {}", style(log.display()).cyan());
    }
}

/// Label/value pairs of the counts block. Unreadable only shows up when non-zero.
fn count_rows(summary: &RunSummary) -> Vec<(&'static str, usize)> {
    let mut rows = vec![
        ("📁 Files Processed:", summary.total()),
        ("✅ Succeeded:", summary.succeeded),
        ("❌ Failed:", summary.failed),
        ("⏭️  Skipped:", summary.skipped),
        ("🚧 Excluded:", summary.excluded),
    ];
    if summary.unreadable > 0 {
        rows.push(("⚠️  Unreadable:", summary.unreadable));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FileOutcome;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_print_summary_report_no_panic() {
        let mut summary = RunSummary::default();
        summary.record(FileOutcome::Succeeded {
            source: PathBuf::from("a.png"),
            destination: PathBuf::from("a.png"),
        });
        for i in 0..15 {
            summary.record(FileOutcome::Failed {
                path: PathBuf::from(format!("f{}.png", i)),
                reason: "Engine exited with status 1".into(),
            });
        }
        summary.cancelled = true;
        summary.elapsed = Duration::from_secs(75);
        summary.log_path = Some(PathBuf::from("/t/downscale_log.txt"));

        print_summary_report(&summary, false);
        print_summary_report(&summary, true);
    }

    #[test]
    fn test_unreadable_count_is_reported() {
        let summary = RunSummary {
            unreadable: 3,
            ..RunSummary::default()
        };
        let rows = count_rows(&summary);
        assert!(rows.contains(&("⚠️  Unreadable:", 3)));

        let rows = count_rows(&RunSummary::default());
        assert!(rows.iter().all(|(label, _)| !label.contains("Unreadable")));
    }

    #[test]
    fn test_print_summary_report_empty() {
        print_summary_report(&RunSummary::default(), false);
    }
}
