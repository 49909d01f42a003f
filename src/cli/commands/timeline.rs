//! Lifecycle preview.
//!
//! Prints either the elapsed-time bucketing table of a configuration or the
//! event sequence of a simulated untouched run.

use crate::cli::args::{OutputFormat, TimelineArgs};
use crate::cli::commands::load_config;
use crate::error::SpecimenError;
use crate::lifecycle::{Bucket, Entry, Mark, buckets, simulate};

/// Prints the timeline.
///
/// # Errors
///
/// Returns an error if the configuration fails to load or JSON output
/// cannot be serialized.
pub fn run(args: &TimelineArgs) -> Result<(), SpecimenError> {
    let config = load_config(args.config.as_deref(), args.time_scale)?;

    if args.simulate {
        let entries = simulate(&config.timings, args.pirate_after);
        match args.format {
            OutputFormat::Human => print!("{}", format_entries(&entries)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        }
    } else {
        let rows = buckets(&config.timings.standard, args.step);
        match args.format {
            OutputFormat::Human => print!("{}", format_buckets(&rows)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        }
    }
    Ok(())
}

fn format_buckets(rows: &[Bucket]) -> String {
    let mut out = format!("{:>10}  {:<8}  {:>8}\n", "elapsed", "stage", "progress");
    for row in rows {
        let stage = row.stage.map_or("expired", |s| s.as_str());
        out.push_str(&format!(
            "{:>9.1}s  {:<8}  {:>8.3}\n",
            seconds(row.elapsed_ms),
            stage,
            row.progress
        ));
    }
    out
}

/// Lists every mark except notifications, which are summarised in a
/// closing line.
fn format_entries(entries: &[Entry]) -> String {
    let mut out = String::new();
    let mut notifications = 0usize;
    for entry in entries {
        let line = match entry.mark {
            Mark::Notify { .. } => {
                notifications += 1;
                continue;
            }
            Mark::StageEntered { stage } => format!("enter {stage}"),
            Mark::TransitionStarted {
                target,
                duration_ms,
            } => format!("transition to {target} over {:.1}s", seconds(duration_ms)),
            Mark::TransitionCompleted { target } => format!("transition to {target} complete"),
            Mark::TerminalHooks => "hide content, prepare terminal screen".to_string(),
            Mark::PirateFadeComplete => "pirate fade-out complete".to_string(),
            Mark::Died { stage } => format!("dead in {stage}"),
        };
        out.push_str(&format!("{:>9.1}s  {line}\n", seconds(entry.at_ms)));
    }
    out.push_str(&format!("{notifications} notifications\n"));
    out
}

#[allow(clippy::cast_precision_loss)]
fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Timings;

    #[test]
    fn bucket_table_names_expired_rows() {
        let rows = buckets(&Timings::default().standard, Duration::from_secs(8));
        let text = format_buckets(&rows);
        assert!(text.starts_with("   elapsed"));
        assert!(text.contains("healthy"));
        assert!(text.contains("expired"));
    }

    #[test]
    fn entry_listing_skips_notifications() {
        let entries = simulate(&Timings::default().scaled(0.01), None);
        let text = format_entries(&entries);
        assert!(text.contains("enter panic"));
        assert!(text.contains("dead in death"));
        assert!(!text.contains("Notify"));
        assert!(text.trim_end().ends_with("notifications"));
    }

    #[test]
    fn pirate_listing_mentions_fade() {
        let entries = simulate(&Timings::default(), Some(Duration::from_secs(1)));
        let text = format_entries(&entries);
        assert!(text.contains("transition to pirate"));
        assert!(text.contains("pirate fade-out complete"));
        assert!(text.contains("dead in pirate"));
    }
}
