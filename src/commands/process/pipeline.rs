use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use super::classifier::Classifier;
use super::identity::extract_identity;
use super::ledger::{ItemStage, Ledger, commit_processed};
use super::merge::merge_student_folder;
use super::pdf_store::{load_document, page_count};
use super::placement::place_segment;
use super::roster::{load_roster, resolve_roster};
use super::segmenter::{SEGMENT_DIR_NAME, SegmentNameParser, SegmentOptions, segment_source};
use super::text_extract::TextExtractor;
use crate::error::PipelineError;
use crate::model::{RosterSummary, RunCounts, Segment, SourceDocument};
use crate::util::{ensure_directory, file_name_string, list_pdf_files};

/// Directories one batch run reads from and writes to.
#[derive(Debug, Clone)]
pub(crate) struct StagingLayout {
    pub inbox: PathBuf,
    pub output_root: PathBuf,
}

impl StagingLayout {
    pub(crate) fn segment_dir(&self) -> PathBuf {
        self.inbox.join(SEGMENT_DIR_NAME)
    }
}

pub(crate) struct PipelineSettings<'a> {
    pub run_id: &'a str,
    pub blank_page_max_bytes: u64,
    pub processed_suffix: &'a str,
    pub overwrite_reports: bool,
    pub roster_path: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub(crate) struct PipelineReport {
    pub counts: RunCounts,
    pub sources: Vec<SourceDocument>,
    pub roster: Option<RosterSummary>,
    pub warnings: Vec<String>,
}

impl PipelineReport {
    fn warn_item(&mut self, stage: &str, item: &str, error: &anyhow::Error) {
        warn!(stage, item, error = %error, "item skipped");
        self.warnings.push(format!("{stage}: {item}: {error:#}"));
    }
}

/// Runs every stage to completion over the whole batch before starting the next.
pub(crate) fn run_pipeline(
    layout: &StagingLayout,
    classifier: &Classifier,
    extractor: &dyn TextExtractor,
    ledger: &mut Ledger,
    settings: &PipelineSettings<'_>,
) -> Result<PipelineReport> {
    let sources = discover_pending(&layout.inbox, ItemStage::Source, ledger)?;
    let segment_dir = layout.segment_dir();
    let leftover_segments = if segment_dir.is_dir() {
        discover_pending(&segment_dir, ItemStage::Segment, ledger)?
    } else {
        Vec::new()
    };

    if sources.is_empty() && leftover_segments.is_empty() {
        return Err(PipelineError::StagingEmpty {
            inbox: layout.inbox.clone(),
        }
        .into());
    }

    if let Some(roster_path) = settings.roster_path {
        if !roster_path.is_file() {
            return Err(PipelineError::RosterMissing {
                path: roster_path.to_path_buf(),
            }
            .into());
        }
    }

    ensure_directory(&segment_dir)?;
    ensure_directory(&layout.output_root)?;

    let mut report = PipelineReport::default();
    report.counts.sources_discovered = sources.len();

    info!(sources = sources.len(), "segmenting source documents");
    segment_sources(&sources, &segment_dir, classifier, ledger, settings, &mut report)?;

    info!("identifying student records");
    let touched = identify_and_place(
        &segment_dir,
        &layout.output_root,
        extractor,
        ledger,
        settings,
        &mut report,
    )?;

    info!(folders = touched.len(), "merging student records");
    merge_folders(&layout.output_root, &touched, settings, &mut report);

    if let Some(roster_path) = settings.roster_path {
        info!(path = %roster_path.display(), "resolving student IDs from roster");
        let roster = load_roster(roster_path)?;
        report.roster = Some(resolve_roster(
            &layout.output_root,
            &roster,
            settings.overwrite_reports,
        )?);
    }

    Ok(report)
}

/// `.pdf` files in `dir` that the ledger has not marked processed.
///
/// A missing directory is an empty staging area.
pub(crate) fn discover_pending(dir: &Path, stage: ItemStage, ledger: &Ledger) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::StagingEmpty {
            inbox: dir.to_path_buf(),
        }
        .into());
    }

    let mut pending = Vec::new();
    for path in list_pdf_files(dir)? {
        let name = file_name_string(&path)?;
        if ledger.is_processed(stage, &name)? {
            warn!(item = %name, stage = stage.as_str(), "already processed, skipped");
            continue;
        }
        pending.push(path);
    }
    Ok(pending)
}

fn segment_sources(
    sources: &[PathBuf],
    segment_dir: &Path,
    classifier: &Classifier,
    ledger: &mut Ledger,
    settings: &PipelineSettings<'_>,
    report: &mut PipelineReport,
) -> Result<()> {
    let options = SegmentOptions {
        segment_dir,
        blank_page_max_bytes: settings.blank_page_max_bytes,
        processed_suffix: settings.processed_suffix,
    };

    for source_path in sources {
        let filename = file_name_string(source_path)?;
        let decision = classifier.classify(&filename);
        info!(
            source = %filename,
            rule = decision.rule_label(),
            group_size = decision.group_size,
            "splitting source"
        );

        let outcome = match segment_source(source_path, decision.group_size, &options) {
            Ok(outcome) => outcome,
            Err(error) => {
                ledger.record_failure(
                    ItemStage::Source,
                    &filename,
                    &format!("{error:#}"),
                    settings.run_id,
                )?;
                report.counts.sources_failed += 1;
                report.warn_item("segment", &filename, &error);
                continue;
            }
        };

        if outcome.page_count == 0 {
            warn!(source = %filename, "source has no pages");
        }

        report.counts.segments_written += outcome.kept().count();
        report.counts.blank_artifacts_removed += outcome.blank_count();
        report.sources.push(SourceDocument {
            filename: filename.clone(),
            page_count: outcome.page_count,
            decision,
        });

        commit_processed(
            ledger,
            ItemStage::Source,
            source_path,
            &filename,
            settings.processed_suffix,
            settings.run_id,
        )?;
        report.counts.sources_processed += 1;
    }

    Ok(())
}

fn identify_and_place(
    segment_dir: &Path,
    output_root: &Path,
    extractor: &dyn TextExtractor,
    ledger: &mut Ledger,
    settings: &PipelineSettings<'_>,
    report: &mut PipelineReport,
) -> Result<BTreeSet<String>> {
    let parser = SegmentNameParser::new()?;
    let mut touched = BTreeSet::new();

    for path in discover_pending(segment_dir, ItemStage::Segment, ledger)? {
        let segment = match parser.parse(&path) {
            Ok(segment) => segment,
            Err(error) => {
                report.counts.segments_failed += 1;
                report.warn_item("identify", &path.display().to_string(), &error);
                continue;
            }
        };

        match identify_one(&segment, output_root, extractor) {
            Ok(full_name) => {
                commit_processed(
                    ledger,
                    ItemStage::Segment,
                    &segment.path,
                    &segment.file_name,
                    settings.processed_suffix,
                    settings.run_id,
                )?;
                report.counts.segments_placed += 1;
                touched.insert(full_name);
            }
            Err(error) => {
                ledger.record_failure(
                    ItemStage::Segment,
                    &segment.file_name,
                    &format!("{error:#}"),
                    settings.run_id,
                )?;
                report.counts.segments_failed += 1;
                report.warn_item("identify", &segment.file_name, &error);
            }
        }
    }

    report.counts.student_folders_touched = touched.len();
    Ok(touched)
}

fn identify_one(segment: &Segment, output_root: &Path, extractor: &dyn TextExtractor) -> Result<String> {
    let identity = extract_identity(extractor, &segment.path)?;
    info!(
        segment = %segment.file_name,
        student = %identity.full_name,
        class = %identity.class_code,
        "identified student record"
    );
    place_segment(segment, &identity, output_root)?;
    Ok(identity.full_name)
}

fn merge_folders(
    output_root: &Path,
    touched: &BTreeSet<String>,
    settings: &PipelineSettings<'_>,
    report: &mut PipelineReport,
) {
    for folder_key in touched {
        match merge_student_folder(output_root, folder_key, settings.overwrite_reports) {
            Ok(_) => report.counts.reports_merged += 1,
            Err(error) => {
                report.counts.reports_failed += 1;
                report.warn_item("merge", folder_key, &error);
            }
        }
    }
}

/// Page count of a staged source, for dry-run listings.
pub(crate) fn source_page_count(path: &Path) -> Result<u32> {
    Ok(page_count(&load_document(path)?))
}
