use anyhow::Result;
use tracing::{info, warn};

use crate::cli::ClassifyArgs;
use crate::commands::process::{
    Classifier, ItemStage, Ledger, discover_pending, plan_page_groups, source_page_count,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::util::{file_name_string, list_pdf_files};

/// Lists what `process` would do with each staged source, without writing anything.
pub fn run(args: ClassifyArgs) -> Result<()> {
    let inbox = args.staging.inbox_dir();
    let ledger_path = args.staging.ledger_path();
    let config = PipelineConfig::load(args.staging.config_path())?;
    let classifier = Classifier::new(config.rules)?;

    let sources = if ledger_path.exists() {
        let ledger = Ledger::open(&ledger_path)?;
        discover_pending(&inbox, ItemStage::Source, &ledger)?
    } else {
        list_pdf_files(&inbox)?
    };

    if sources.is_empty() {
        return Err(PipelineError::StagingEmpty { inbox }.into());
    }

    for rule in classifier.rules() {
        info!(
            rule = %rule.name,
            keywords = %rule.keywords.join(", "),
            group_size = rule.group_size,
            "classification rule"
        );
    }

    let mut expected_segments = 0usize;
    for path in &sources {
        let filename = file_name_string(path)?;
        let decision = classifier.classify(&filename);

        match source_page_count(path) {
            Ok(page_count) => {
                let groups = plan_page_groups(page_count, decision.group_size)?;
                expected_segments += groups.len();
                let trailing = groups
                    .last()
                    .map(|range| range.len())
                    .filter(|len| *len < decision.group_size);
                info!(
                    source = %filename,
                    rule = decision.rule_label(),
                    group_size = decision.group_size,
                    pages = page_count,
                    segments = groups.len(),
                    short_last_group = trailing.unwrap_or(0),
                    "classified source"
                );
            }
            Err(error) => {
                warn!(source = %filename, error = %error, "source could not be read");
            }
        }
    }

    info!(
        sources = sources.len(),
        expected_segments, "classify dry-run complete"
    );

    Ok(())
}
