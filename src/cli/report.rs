use std::path::{Path, PathBuf};

use chrono::Local;
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::db::get_connection;
use crate::error::{ReportError, Result};
use crate::metrics::ThresholdTable;
use crate::report::{CancelFlag, ReportContext, ReportOutcome, ReportStatus};
use crate::reports::{run_report, ReportKind, ReportParams};
use crate::settings::{load_settings, Settings};
use crate::sink::TextSink;
use crate::xlsx::XlsxSink;

pub struct ReportArgs {
    pub kind: ReportKind,
    pub params: ReportParams,
    pub max_rows: Option<u32>,
    pub format: OutputFormat,
    pub output: Option<String>,
}

fn default_output(settings: &Settings, kind: ReportKind) -> PathBuf {
    PathBuf::from(&settings.output_dir).join(format!(
        "{}-{}.xlsx",
        kind.name(),
        Local::now().format("%Y-%m-%d")
    ))
}

fn context_for(settings: &Settings, kind: ReportKind, subtitle: Vec<String>, max_rows: Option<u32>) -> ReportContext {
    let rules = settings
        .thresholds_for(kind.name())
        .map(<[_]>::to_vec)
        .unwrap_or_else(|| kind.default_thresholds());
    ReportContext {
        subtitle,
        max_rows_per_page: max_rows.unwrap_or(settings.max_rows_per_page),
        thresholds: ThresholdTable::new(rules),
        grand_total: settings.grand_total,
        cancel: CancelFlag::new(),
    }
}

pub fn run(args: ReportArgs) -> Result<()> {
    let settings = load_settings();
    settings.validate()?;
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(ReportError::Other("No database found. Run `fillsheet init` first.".into()));
    }
    let conn = get_connection(&db_path)?;

    let report = args.kind.resolve(&args.params)?;
    let context = context_for(&settings, args.kind, report.subtitle.clone(), args.max_rows);

    let outcome = match args.format {
        OutputFormat::Xlsx => {
            let path = planned_output(&settings, args.kind, args.output.as_deref());
            let mut sink = XlsxSink::new(&path);
            let outcome = run_report(&conn, &report, &context, &mut sink)?;
            if outcome.is_success() {
                println!("Saved {}", sink.path().display());
            }
            outcome
        }
        OutputFormat::Text => {
            let mut sink = TextSink::new();
            let outcome = run_report(&conn, &report, &context, &mut sink)?;
            if let Some(text) = sink.output() {
                print!("{text}");
            }
            outcome
        }
    };

    print_outcome(&outcome);
    if outcome.status == ReportStatus::Failed {
        return Err(ReportError::Other(format!(
            "{} report failed: {}",
            args.kind.name(),
            outcome.errors.join("; ")
        )));
    }
    Ok(())
}

fn print_outcome(outcome: &ReportOutcome) {
    let status = match outcome.status {
        ReportStatus::Completed => "completed".green().bold(),
        ReportStatus::Cancelled => "cancelled".yellow().bold(),
        ReportStatus::Failed => "failed".red().bold(),
    };
    println!(
        "Report {status}: {} rows read, {} groups, {} page(s)",
        outcome.rows_read, outcome.groups, outcome.pages
    );
    if outcome.rejected_rows > 0 {
        println!("{}", format!("  {} row(s) rejected", outcome.rejected_rows).yellow());
    }
    for w in &outcome.warnings {
        println!("  {} {w}", "warning:".yellow());
    }
    for e in &outcome.errors {
        eprintln!("  {} {e}", "error:".red());
    }
}

/// `--output` when given, otherwise a dated file in the output directory.
fn planned_output(settings: &Settings, kind: ReportKind, output: Option<&str>) -> PathBuf {
    output
        .map(|o| Path::new(o).to_path_buf())
        .unwrap_or_else(|| default_output(settings, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Threshold;

    #[test]
    fn test_default_output_name() {
        let settings = Settings {
            output_dir: "/tmp/out".into(),
            ..Settings::default()
        };
        let path = planned_output(&settings, ReportKind::PerfectOrder, None);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("perfect-order-"));
        assert!(name.ends_with(".xlsx"));
        assert!(path.starts_with("/tmp/out"));
        assert_eq!(
            planned_output(&settings, ReportKind::FillRate, Some("x.xlsx")),
            PathBuf::from("x.xlsx")
        );
    }

    #[test]
    fn test_settings_thresholds_replace_defaults() {
        let mut settings = Settings::default();
        let ctx = context_for(&settings, ReportKind::FillRate, vec![], None);
        assert_eq!(ctx.thresholds.rules, vec![Threshold::below("fill_rate", 97.0)]);
        assert_eq!(ctx.max_rows_per_page, 65_536);

        settings
            .thresholds
            .insert("fill-rate".into(), vec![Threshold::below("fill_rate", 90.0)]);
        let ctx = context_for(&settings, ReportKind::FillRate, vec![], Some(100));
        assert_eq!(ctx.thresholds.rules, vec![Threshold::below("fill_rate", 90.0)]);
        assert_eq!(ctx.max_rows_per_page, 100);
    }
}
