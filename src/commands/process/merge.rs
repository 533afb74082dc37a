use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::pdf_store::merge_documents;
use crate::error::PipelineError;
use crate::util::list_pdf_files;

/// Member files of a student folder in merge order: ascending by file name.
pub(crate) fn merge_order(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut members = list_pdf_files(folder)?;
    members.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(members)
}

pub(crate) fn report_path(output_root: &Path, folder_key: &str) -> PathBuf {
    output_root.join(format!("{folder_key}.pdf"))
}

/// Merges `<output_root>/<folder_key>/*.pdf` into `<output_root>/<folder_key>.pdf`.
///
/// The report is written next to the folder, never inside it.
pub(crate) fn merge_student_folder(
    output_root: &Path,
    folder_key: &str,
    overwrite: bool,
) -> Result<PathBuf> {
    let folder = output_root.join(folder_key);
    let target = report_path(output_root, folder_key);
    if target.exists() && !overwrite {
        return Err(PipelineError::conflict(target).into());
    }

    let members = merge_order(&folder)?;
    let mut partial = target.clone().into_os_string();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let page_count = merge_documents(&members, &partial)?;
    fs::rename(&partial, &target).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            partial.display(),
            target.display()
        )
    })?;

    info!(
        student = folder_key,
        members = members.len(),
        pages = page_count,
        report = %target.display(),
        "merged student report"
    );

    Ok(target)
}
