use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::pdf_store::load_document;
use crate::cli::TextBackend;

/// Reading-order text layer of a PDF, one line per newline.
pub(crate) trait TextExtractor {
    fn name(&self) -> &'static str;
    fn extract_text(&self, pdf_path: &Path) -> Result<String>;
}

pub(crate) struct PdftotextExtractor;

impl TextExtractor for PdftotextExtractor {
    fn name(&self) -> &'static str {
        "pdftotext"
    }

    fn extract_text(&self, pdf_path: &Path) -> Result<String> {
        let output = Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg(pdf_path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftotext returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        Ok(clean_text_layer(&String::from_utf8_lossy(&output.stdout)))
    }
}

pub(crate) struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_text(&self, pdf_path: &Path) -> Result<String> {
        let document = load_document(pdf_path)?;
        let page_numbers = document.get_pages().into_keys().collect::<Vec<u32>>();
        let text = document
            .extract_text(&page_numbers)
            .with_context(|| format!("failed to extract text from {}", pdf_path.display()))?;
        Ok(clean_text_layer(&text))
    }
}

/// Page breaks become line breaks; NULs are dropped.
fn clean_text_layer(raw: &str) -> String {
    raw.replace('\u{0000}', "").replace('\u{000C}', "\n")
}

fn command_available(program: &str) -> bool {
    Command::new(program).arg("-v").output().is_ok()
}

pub(crate) fn select_extractor(backend: TextBackend) -> Result<Box<dyn TextExtractor>> {
    let extractor: Box<dyn TextExtractor> = match backend {
        TextBackend::Pdftotext => {
            if !command_available("pdftotext") {
                bail!("text backend 'pdftotext' requested but pdftotext is unavailable");
            }
            Box::new(PdftotextExtractor)
        }
        TextBackend::Lopdf => Box::new(LopdfExtractor),
        TextBackend::Auto => {
            if command_available("pdftotext") {
                Box::new(PdftotextExtractor)
            } else {
                warn!("pdftotext unavailable, falling back to lopdf text extraction");
                Box::new(LopdfExtractor)
            }
        }
    };

    info!(
        requested = backend.as_str(),
        backend = extractor.name(),
        "selected text extraction backend"
    );
    Ok(extractor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_layer_turns_page_breaks_into_lines() {
        let cleaned = clean_text_layer("Jane Doe\nMath 101\u{000C}Page two\u{0000}");
        assert_eq!(cleaned, "Jane Doe\nMath 101\nPage two");
    }

    #[test]
    fn lopdf_backend_is_always_selectable() {
        let extractor = select_extractor(TextBackend::Lopdf).expect("lopdf backend");
        assert_eq!(extractor.name(), "lopdf");
    }
}
