use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::process::{ItemStage, Ledger};
use crate::model::RunCounts;
use crate::util::list_pdf_files;

pub fn run(args: StatusArgs) -> Result<()> {
    let inbox = args.staging.inbox_dir();
    let output_root = args.staging.output_dir();
    let ledger_path = args.staging.ledger_path();

    info!(staging_root = %args.staging.staging_root.display(), "status requested");

    if inbox.is_dir() {
        info!(
            path = %inbox.display(),
            staged_pdfs = list_pdf_files(&inbox)?.len(),
            "inbox"
        );
    } else {
        warn!(path = %inbox.display(), "inbox missing");
    }

    if output_root.is_dir() {
        info!(
            path = %output_root.display(),
            reports = list_pdf_files(&output_root)?.len(),
            "output root"
        );
    } else {
        warn!(path = %output_root.display(), "output root missing");
    }

    if !ledger_path.exists() {
        warn!(path = %ledger_path.display(), "run-state ledger missing");
        return Ok(());
    }

    let ledger = Ledger::open(&ledger_path)?;
    for count in ledger.status_counts()? {
        info!(
            stage = %count.stage,
            status = %count.status,
            count = count.count,
            "ledger items"
        );
    }

    for stage in [ItemStage::Source, ItemStage::Segment] {
        for (name, detail) in ledger.failed_items(stage)? {
            warn!(stage = stage.as_str(), item = %name, detail = %detail, "awaiting manual review");
        }
    }

    match ledger.latest_run()? {
        Some(run) => {
            let counts = run
                .summary_json
                .as_deref()
                .and_then(|raw| serde_json::from_str::<RunCounts>(raw).ok());
            info!(
                run_id = %run.run_id,
                status = %run.status,
                started_at = %run.started_at,
                finished_at = %run.finished_at.as_deref().unwrap_or_default(),
                segments_placed = counts.as_ref().map(|c| c.segments_placed).unwrap_or_default(),
                reports_merged = counts.as_ref().map(|c| c.reports_merged).unwrap_or_default(),
                "latest run"
            );
        }
        None => warn!("no runs recorded"),
    }

    Ok(())
}
