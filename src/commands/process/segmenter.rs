use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use super::pdf_store::{
    check_page_range, has_visible_content, load_document, page_count as pdf_page_count,
    write_page_range,
};
use crate::error::PipelineError;
use crate::model::{PageRange, Segment, SegmentWrite};
use crate::util::file_name_string;

pub(crate) const SEGMENT_DIR_NAME: &str = "_segments";

/// Inclusive 1-based page ranges for `page_count` pages grouped `group_size` at a time.
///
/// The final range covers only the remaining pages.
pub(crate) fn plan_page_groups(page_count: u32, group_size: u32) -> Result<Vec<PageRange>> {
    if group_size == 0 {
        bail!("page group size must be at least 1");
    }

    let mut ranges = Vec::with_capacity(page_count.div_ceil(group_size) as usize);
    let mut first = 1;
    while first <= page_count {
        let remaining = page_count - first + 1;
        let last = first + remaining.min(group_size) - 1;
        ranges.push(PageRange { first, last });
        first = last + 1;
    }
    Ok(ranges)
}

pub(crate) fn segment_file_name(source_stem: &str, group_index: u32) -> String {
    format!("{source_stem}_i_{group_index:03}.pdf")
}

/// Leading digit run of a source name, zero-padded to three places; `000` when absent.
pub(crate) fn source_ordinal(source_stem: &str) -> String {
    let digits = source_stem
        .chars()
        .take_while(|character| character.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        "000".to_string()
    } else {
        format!("{digits:0>3}")
    }
}

/// Recovers a segment's origin from its file name.
pub(crate) struct SegmentNameParser {
    pattern: Regex,
}

impl SegmentNameParser {
    pub(crate) fn new() -> Result<Self> {
        let pattern = Regex::new(r"^(?P<source>.+)_i_(?P<index>\d+)\.(?i:pdf)$")
            .context("failed to compile segment filename regex")?;
        Ok(Self { pattern })
    }

    pub(crate) fn parse(&self, path: &Path) -> Result<Segment> {
        let file_name = file_name_string(path)?;
        let captures = self
            .pattern
            .captures(&file_name)
            .with_context(|| format!("not a segment file name: {file_name}"))?;

        let source_stem = captures
            .name("source")
            .map(|m| m.as_str().to_string())
            .context("missing source capture")?;
        let group_index = captures
            .name("index")
            .map(|m| m.as_str())
            .context("missing index capture")?
            .parse::<u32>()
            .with_context(|| format!("invalid group index in {file_name}"))?;

        Ok(Segment {
            ordinal: source_ordinal(&source_stem),
            source_stem,
            group_index,
            file_name,
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SegmentOptions<'a> {
    pub segment_dir: &'a Path,
    pub blank_page_max_bytes: u64,
    pub processed_suffix: &'a str,
}

#[derive(Debug, Default)]
pub(crate) struct SegmentationOutcome {
    pub page_count: u32,
    pub written: Vec<SegmentWrite>,
}

impl SegmentationOutcome {
    pub(crate) fn kept(&self) -> impl Iterator<Item = &SegmentWrite> {
        self.written.iter().filter(|write| !write.blank)
    }

    pub(crate) fn blank_count(&self) -> usize {
        self.written.iter().filter(|write| write.blank).count()
    }
}

/// Splits `source_path` into groups of `group_size` pages under `segment_dir`.
///
/// Every range and destination is validated before the first file is written,
/// so a failing source leaves no partial segments behind.
pub(crate) fn segment_source(
    source_path: &Path,
    group_size: u32,
    options: &SegmentOptions<'_>,
) -> Result<SegmentationOutcome> {
    let document = load_document(source_path)?;
    let page_count = pdf_page_count(&document);
    let source_name = file_name_string(source_path)?;
    let source_stem = source_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", source_path.display()))?;

    let ranges = plan_page_groups(page_count, group_size)?;
    for (index, range) in ranges.iter().enumerate() {
        check_page_range(&source_name, *range, page_count)?;

        let output = options
            .segment_dir
            .join(segment_file_name(&source_stem, index as u32 + 1));
        let mut consumed = output.clone().into_os_string();
        consumed.push(options.processed_suffix);
        if output.exists() || Path::new(&consumed).exists() {
            return Err(PipelineError::conflict(output).into());
        }
    }

    let mut outcome = SegmentationOutcome {
        page_count,
        written: Vec::with_capacity(ranges.len()),
    };

    for (index, range) in ranges.into_iter().enumerate() {
        let group_index = index as u32 + 1;
        let file_name = segment_file_name(&source_stem, group_index);
        let output = options.segment_dir.join(&file_name);
        write_page_range(&document, &source_name, range, &output)?;

        let size_bytes = fs::metadata(&output)
            .with_context(|| format!("failed to stat {}", output.display()))?
            .len();
        let under_threshold = size_bytes <= options.blank_page_max_bytes;
        let blank = under_threshold && !segment_has_content(&output);

        if blank {
            fs::remove_file(&output)
                .with_context(|| format!("failed to delete blank artifact {}", output.display()))?;
            info!(
                source = %source_name,
                segment = %file_name,
                first_page = range.first,
                last_page = range.last,
                size_bytes,
                "blank page artifact detected, deleted"
            );
        } else if under_threshold {
            warn!(
                source = %source_name,
                segment = %file_name,
                size_bytes,
                "segment under blank threshold has content, kept"
            );
        }

        outcome.written.push(SegmentWrite {
            segment: Segment {
                source_stem: source_stem.clone(),
                ordinal: source_ordinal(&source_stem),
                group_index,
                file_name,
                path: output,
            },
            pages: range,
            size_bytes,
            blank,
        });
    }

    Ok(outcome)
}

/// Unreadable segments count as having content so they are never deleted.
pub(crate) fn segment_has_content(path: &Path) -> bool {
    match load_document(path) {
        Ok(document) => has_visible_content(&document),
        Err(error) => {
            warn!(segment = %path.display(), error = %error, "segment unreadable, kept");
            true
        }
    }
}
