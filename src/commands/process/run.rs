use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use super::classifier::Classifier;
use super::ledger::Ledger;
use super::pipeline::{PipelineReport, PipelineSettings, StagingLayout, run_pipeline};
use super::text_extract::select_extractor;
use crate::cli::ProcessArgs;
use crate::config::PipelineConfig;
use crate::model::{RunManifest, RunPaths};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: ProcessArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let layout = StagingLayout {
        inbox: args.staging.inbox_dir(),
        output_root: args.staging.output_dir(),
    };
    let manifest_dir = args.staging.manifests_dir();
    ensure_directory(&manifest_dir)?;
    let manifest_path = manifest_dir.join(format!("run_{}.json", utc_compact_string(started_ts)));
    let ledger_path = args.staging.ledger_path();
    let roster_path = (!args.skip_roster).then(|| args.roster_file());

    let mut config = PipelineConfig::load(args.staging.config_path())?;
    if let Some(max_bytes) = args.blank_page_max_bytes {
        config.blank_page_max_bytes = max_bytes;
    }
    config.validate()?;

    info!(
        inbox = %layout.inbox.display(),
        output_root = %layout.output_root.display(),
        run_id = %run_id,
        "starting report run"
    );
    for rule in &config.rules {
        info!(
            rule = %rule.name,
            keywords = %rule.keywords.join(", "),
            group_size = rule.group_size,
            "multi-page split rule"
        );
    }

    let classifier = Classifier::new(config.rules.clone())?;
    let extractor = select_extractor(args.text_backend)?;
    let mut ledger = Ledger::open(&ledger_path)?;
    let command = render_process_command(&args);
    ledger.begin_run(&run_id, &started_at, &command)?;

    let settings = PipelineSettings {
        run_id: &run_id,
        blank_page_max_bytes: config.blank_page_max_bytes,
        processed_suffix: &config.processed_suffix,
        overwrite_reports: args.overwrite_reports,
        roster_path: roster_path.as_deref(),
    };

    let report = match run_pipeline(&layout, &classifier, extractor.as_ref(), &mut ledger, &settings)
    {
        Ok(report) => report,
        Err(error) => {
            let summary = serde_json::json!({ "error": format!("{error:#}") }).to_string();
            ledger.finish_run(&run_id, "failed", &summary)?;
            return Err(error).context("report run aborted");
        }
    };

    let status = if report.warnings.is_empty() {
        "completed"
    } else {
        "completed_with_warnings"
    };

    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command,
        text_backend: extractor.name().to_string(),
        paths: RunPaths {
            staging_root: args.staging.staging_root.display().to_string(),
            inbox: layout.inbox.display().to_string(),
            output_root: layout.output_root.display().to_string(),
            ledger_path: ledger_path.display().to_string(),
            roster_path: roster_path.as_ref().map(|path| path.display().to_string()),
        },
        counts: report.counts.clone(),
        sources: report.sources.clone(),
        roster: report.roster.clone(),
        warnings: report.warnings.clone(),
    };

    write_json_pretty(&manifest_path, &manifest)?;
    let summary_json =
        serde_json::to_string(&manifest.counts).context("failed to serialize run counts")?;
    ledger.finish_run(&run_id, status, &summary_json)?;

    info!(path = %manifest_path.display(), "wrote run manifest");
    print_summary(&report);

    Ok(())
}

fn print_summary(report: &PipelineReport) {
    let counts = &report.counts;
    println!(
        "Sources split: {} ({} failed), segments kept: {}, blank pages removed: {}",
        counts.sources_processed,
        counts.sources_failed,
        counts.segments_written,
        counts.blank_artifacts_removed
    );
    println!(
        "Segments filed: {} ({} need review), reports merged: {} ({} failed)",
        counts.segments_placed, counts.segments_failed, counts.reports_merged, counts.reports_failed
    );

    match &report.roster {
        Some(roster) if !roster.review_required() => {
            println!("{} student records successfully processed", roster.matched);
        }
        Some(roster) => {
            println!("REVIEW REQUIRED");
            println!(
                "{} student records matched, {} roster entries not matched",
                roster.matched, roster.unmatched
            );
            for name in &roster.unmatched_names {
                println!("  no report for roster entry: {name}");
            }
            for name in &roster.unclaimed_reports {
                println!("  report without roster entry: {name}");
            }
            println!("Check the name in the PDF against the roster file");
        }
        None => warn!("roster resolution skipped"),
    }

    for warning in &report.warnings {
        println!("  {warning}");
    }
}

fn render_process_command(args: &ProcessArgs) -> String {
    let mut parts = vec![
        "sbg-reports".to_string(),
        "process".to_string(),
        "--staging-root".to_string(),
        args.staging.staging_root.display().to_string(),
        "--text-backend".to_string(),
        args.text_backend.as_str().to_string(),
    ];

    if let Some(inbox) = &args.staging.inbox {
        parts.push("--inbox".to_string());
        parts.push(inbox.display().to_string());
    }
    if let Some(output_root) = &args.staging.output_root {
        parts.push("--output-root".to_string());
        parts.push(output_root.display().to_string());
    }
    if let Some(config) = &args.staging.config {
        parts.push("--config".to_string());
        parts.push(config.display().to_string());
    }
    if let Some(roster_path) = &args.roster_path {
        parts.push("--roster-path".to_string());
        parts.push(roster_path.display().to_string());
    }
    if let Some(max_bytes) = args.blank_page_max_bytes {
        parts.push("--blank-page-max-bytes".to_string());
        parts.push(max_bytes.to_string());
    }
    if args.overwrite_reports {
        parts.push("--overwrite-reports".to_string());
    }
    if args.skip_roster {
        parts.push("--skip-roster".to_string());
    }

    parts.join(" ")
}
