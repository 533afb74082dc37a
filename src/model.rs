use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of matching a source filename against the classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationDecision {
    pub rule: Option<String>,
    pub group_size: u32,
}

impl ClassificationDecision {
    pub fn rule_label(&self) -> &str {
        self.rule.as_deref().unwrap_or("default")
    }
}

/// A raw multi-student document staged in the inbox.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub filename: String,
    pub page_count: u32,
    pub decision: ClassificationDecision,
}

/// Inclusive, 1-based page range of one student group inside a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn len(self) -> u32 {
        self.last + 1 - self.first
    }

    pub fn page_numbers(self) -> impl Iterator<Item = u32> {
        self.first..=self.last
    }
}

/// A page-group sub-document; carries its own origin through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub source_stem: String,
    pub ordinal: String,
    pub group_index: u32,
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentWrite {
    pub segment: Segment,
    pub pages: PageRange,
    pub size_bytes: u64,
    pub blank: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub full_name: String,
    pub class_label: String,
    pub class_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub unmatched_names: Vec<String>,
    pub unclaimed_reports: Vec<String>,
    pub skipped_rows: usize,
}

impl RosterSummary {
    pub fn review_required(&self) -> bool {
        self.unmatched > 0 || !self.unclaimed_reports.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub sources_discovered: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub segments_written: usize,
    pub blank_artifacts_removed: usize,
    pub segments_placed: usize,
    pub segments_failed: usize,
    pub student_folders_touched: usize,
    pub reports_merged: usize,
    pub reports_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub staging_root: String,
    pub inbox: String,
    pub output_root: String,
    pub ledger_path: String,
    pub roster_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub text_backend: String,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub sources: Vec<SourceDocument>,
    pub roster: Option<RosterSummary>,
    pub warnings: Vec<String>,
}
