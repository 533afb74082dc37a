use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::{RosterEntry, RosterSummary};
use crate::util::list_pdf_files;

#[derive(Debug, Default)]
pub(crate) struct Roster {
    pub entries: Vec<RosterEntry>,
    pub skipped_rows: usize,
}

/// Reads `ID,Full Name[,...]` rows. There is no header row.
pub(crate) fn load_roster(path: &Path) -> Result<Roster> {
    if !path.is_file() {
        return Err(PipelineError::RosterMissing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open roster {}", path.display()))?;

    let mut roster = Roster::default();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("failed to read roster row {} in {}", index + 1, path.display()))?;

        let student_id = record
            .get(0)
            .map(|value| value.trim_start_matches('\u{feff}').trim())
            .unwrap_or_default();
        let full_name = record.get(1).map(str::trim).unwrap_or_default();

        if student_id.is_empty() || full_name.is_empty() {
            warn!(row = index + 1, path = %path.display(), "roster row needs an ID and a name, skipped");
            roster.skipped_rows += 1;
            continue;
        }

        roster.entries.push(RosterEntry {
            student_id: student_id.to_string(),
            full_name: full_name.to_string(),
        });
    }

    info!(
        path = %path.display(),
        entries = roster.entries.len(),
        skipped = roster.skipped_rows,
        "loaded roster"
    );
    Ok(roster)
}

/// Renames `<full name>.pdf` reports at `output_root` to `<student id>.pdf`.
///
/// Misses and rename conflicts are counted, not fatal. With `overwrite`, an
/// existing `<student id>.pdf` is replaced by the freshly merged report.
pub(crate) fn resolve_roster(
    output_root: &Path,
    roster: &Roster,
    overwrite: bool,
) -> Result<RosterSummary> {
    let mut summary = RosterSummary {
        skipped_rows: roster.skipped_rows,
        ..RosterSummary::default()
    };

    for entry in &roster.entries {
        let current = output_root.join(format!("{}.pdf", entry.full_name));
        let renamed = output_root.join(format!("{}.pdf", entry.student_id));

        if !current.is_file() {
            warn!(student = %entry.full_name, id = %entry.student_id, "no consolidated report matches roster entry");
            summary.unmatched += 1;
            summary.unmatched_names.push(entry.full_name.clone());
            continue;
        }

        if renamed.exists() && overwrite {
            info!(student = %entry.full_name, target = %renamed.display(), "replacing earlier ID report");
        } else if renamed.exists() {
            warn!(
                student = %entry.full_name,
                target = %renamed.display(),
                error = %PipelineError::conflict(&renamed),
                "roster rename target taken, report left in place"
            );
            summary.unmatched += 1;
            summary.unmatched_names.push(entry.full_name.clone());
            continue;
        }

        fs::rename(&current, &renamed).with_context(|| {
            format!(
                "failed to rename {} to {}",
                current.display(),
                renamed.display()
            )
        })?;
        info!(student = %entry.full_name, id = %entry.student_id, "matched roster entry");
        summary.matched += 1;
    }

    let known_ids = roster
        .entries
        .iter()
        .map(|entry| entry.student_id.as_str())
        .collect::<HashSet<&str>>();
    for report in list_pdf_files(output_root)? {
        let stem = report
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        if !known_ids.contains(stem) {
            summary.unclaimed_reports.push(stem.to_string());
        }
    }
    for name in &summary.unclaimed_reports {
        warn!(report = %name, "consolidated report has no roster entry");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_roster(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("StudentIDs.csv");
        fs::write(&path, contents).expect("write roster");
        path
    }

    #[test]
    fn renames_matched_reports_and_counts_misses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output_root = dir.path().join("Processed");
        fs::create_dir_all(output_root.join("Jane Doe")).expect("mkdir");
        fs::write(output_root.join("Jane Doe.pdf"), b"jane").expect("write");
        fs::write(output_root.join("John Smith.pdf"), b"john").expect("write");

        let roster_path = write_roster(dir.path(), "1001,Jane Doe\n1002,Mark Lee\n");
        let roster = load_roster(&roster_path).expect("roster");
        let summary = resolve_roster(&output_root, &roster, false).expect("resolve");

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.unmatched_names, vec!["Mark Lee"]);
        assert_eq!(summary.unclaimed_reports, vec!["John Smith"]);
        assert!(summary.review_required());
        assert_eq!(fs::read(output_root.join("1001.pdf")).expect("read"), b"jane");
        assert!(!output_root.join("Jane Doe.pdf").exists());
        assert!(output_root.join("John Smith.pdf").exists());
    }

    #[test]
    fn short_rows_are_skipped_and_fields_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let roster_path = write_roster(
            dir.path(),
            "\u{feff}1001 , Jane Doe ,extra\n1002\n,Nobody\n1003,Mark Lee\n",
        );

        let roster = load_roster(&roster_path).expect("roster");

        assert_eq!(roster.skipped_rows, 2);
        assert_eq!(
            roster.entries,
            vec![
                RosterEntry {
                    student_id: "1001".to_string(),
                    full_name: "Jane Doe".to_string(),
                },
                RosterEntry {
                    student_id: "1003".to_string(),
                    full_name: "Mark Lee".to_string(),
                },
            ]
        );
    }

    #[test]
    fn missing_roster_is_a_typed_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = load_roster(&dir.path().join("absent.csv")).expect_err("missing");

        assert!(matches!(
            error.downcast_ref::<PipelineError>(),
            Some(PipelineError::RosterMissing { .. })
        ));
    }

    #[test]
    fn existing_id_report_is_replaced_only_when_overwriting() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Jane Doe.pdf"), b"new").expect("write");
        fs::write(dir.path().join("1001.pdf"), b"old").expect("write");

        let roster = Roster {
            entries: vec![RosterEntry {
                student_id: "1001".to_string(),
                full_name: "Jane Doe".to_string(),
            }],
            skipped_rows: 0,
        };
        let summary = resolve_roster(dir.path(), &roster, false).expect("resolve");

        assert_eq!(summary.matched, 0);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(fs::read(dir.path().join("1001.pdf")).expect("read"), b"old");
        assert_eq!(summary.unclaimed_reports, vec!["Jane Doe"]);

        let summary = resolve_roster(dir.path(), &roster, true).expect("resolve");

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched, 0);
        assert_eq!(fs::read(dir.path().join("1001.pdf")).expect("read"), b"new");
        assert!(!dir.path().join("Jane Doe.pdf").exists());
        assert!(summary.unclaimed_reports.is_empty());
    }
}
