use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

pub fn file_name_string(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Regular `.pdf` files directly inside `dir`, sorted by path.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if is_pdf(&path) {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs)
}

/// Renames `path` to `path + suffix`; refuses to replace an existing file.
pub fn append_suffix(path: &Path, suffix: &str) -> Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(suffix);
    let target = PathBuf::from(target);

    if target.exists() {
        return Err(PipelineError::conflict(&target).into());
    }

    fs::rename(path, &target).with_context(|| {
        format!(
            "failed to rename {} to {}",
            path.display(),
            target.display()
        )
    })?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_pdf_files_skips_directories_and_marked_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("2_Math.pdf"), b"x").expect("write");
        fs::write(dir.path().join("1_Science.PDF"), b"x").expect("write");
        fs::write(dir.path().join("0_Old.pdf.processed"), b"x").expect("write");
        fs::write(dir.path().join("notes.txt"), b"x").expect("write");
        fs::create_dir(dir.path().join("nested.pdf")).expect("mkdir");

        let names = list_pdf_files(dir.path())
            .expect("listing")
            .iter()
            .map(|path| file_name_string(path).expect("utf-8"))
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["1_Science.PDF", "2_Math.pdf"]);
    }

    #[test]
    fn append_suffix_refuses_existing_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("a.pdf");
        fs::write(&source, b"x").expect("write");
        fs::write(dir.path().join("a.pdf.processed"), b"y").expect("write");

        let err = append_suffix(&source, ".processed").expect_err("should conflict");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::FilesystemConflict { .. })
        ));
        assert!(source.exists());
    }
}
