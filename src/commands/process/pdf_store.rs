use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::error::PipelineError;
use crate::model::PageRange;

pub(crate) fn load_document(path: &Path) -> Result<Document> {
    Document::load(path).with_context(|| format!("failed to load PDF {}", path.display()))
}

pub(crate) fn page_count(document: &Document) -> u32 {
    document.get_pages().len() as u32
}

pub(crate) fn check_page_range(
    source_name: &str,
    range: PageRange,
    page_count: u32,
) -> Result<(), PipelineError> {
    if range.first == 0 || range.first > range.last || range.last > page_count {
        return Err(PipelineError::PageRangeOutOfBounds {
            source_name: source_name.to_string(),
            start: range.first,
            end: range.last,
            page_count,
        });
    }
    Ok(())
}

/// Writes the pages in `range` of `source` to `output` as a standalone document.
pub(crate) fn write_page_range(
    source: &Document,
    source_name: &str,
    range: PageRange,
    output: &Path,
) -> Result<()> {
    check_page_range(source_name, range, page_count(source))?;

    let mut subset = source.clone();
    let kept = range.page_numbers().collect::<Vec<u32>>();
    let excluded = subset
        .get_pages()
        .into_keys()
        .filter(|page_number| !kept.contains(page_number))
        .collect::<Vec<u32>>();
    subset.delete_pages(&excluded);
    subset.prune_objects();
    subset.renumber_objects();

    subset
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(())
}

/// Page attributes a page may take from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// True when any page carries a non-empty content stream or XObject resources.
///
/// Pages whose content cannot be decoded count as having content.
pub(crate) fn has_visible_content(document: &Document) -> bool {
    document.get_pages().into_iter().any(|(page_number, page_id)| {
        let drawn = match document.get_page_content(page_id) {
            Ok(content) => content.iter().any(|byte| !byte.is_ascii_whitespace()),
            Err(error) => {
                debug!(page = page_number, error = %error, "page content unreadable");
                true
            }
        };
        drawn || has_xobjects(document, page_id)
    })
}

fn has_xobjects(document: &Document, page_id: ObjectId) -> bool {
    let Ok(page) = page_with_inherited_attributes(document, page_id) else {
        return false;
    };
    page.get(b"Resources")
        .ok()
        .and_then(|resources| resolve_dictionary(document, resources))
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve_dictionary(document, xobjects))
        .is_some_and(|xobjects| !xobjects.is_empty())
}

fn resolve_dictionary<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dictionary) => Some(dictionary),
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// The page dictionary with every inheritable attribute it lacks copied down
/// from its `Parent` chain.
fn page_with_inherited_attributes(
    document: &Document,
    page_id: ObjectId,
) -> Result<Dictionary> {
    let mut page = document
        .get_dictionary(page_id)
        .with_context(|| format!("page object {page_id:?} is not a dictionary"))?
        .clone();

    let mut visited = HashSet::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(parent_id) = parent {
        if !visited.insert(parent_id) {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_PAGE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}

/// Concatenates the pages of `inputs`, in order, into one document at `output`.
///
/// Returns the number of pages written.
pub(crate) fn merge_documents(inputs: &[PathBuf], output: &Path) -> Result<u32> {
    if inputs.is_empty() {
        bail!("no documents to merge into {}", output.display());
    }

    let mut merged = Document::with_version("1.5");
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages_root: Option<(ObjectId, Object)> = None;

    for input in inputs {
        let mut document = load_document(input)?;
        document.renumber_objects_with(max_id);
        max_id = document.max_id + 1;

        // Intermediate page-tree nodes are dropped below, so each page takes
        // its inherited attributes along.
        for (_, page_id) in document.get_pages() {
            let page = page_with_inherited_attributes(&document, page_id)
                .with_context(|| format!("missing page object in {}", input.display()))?;
            pages.push((page_id, page));
        }

        for (object_id, object) in document.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" => {
                    if catalog.is_none() {
                        catalog = Some((object_id, object));
                    }
                }
                b"Pages" => {
                    if pages_root.is_none() {
                        pages_root = Some((object_id, object));
                    }
                }
                b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    merged.objects.insert(object_id, object);
                }
            }
        }
    }

    let (catalog_id, catalog_object) = catalog.context("merged inputs have no catalog")?;
    let (pages_id, pages_object) = pages_root.context("merged inputs have no page tree")?;

    let page_count = pages.len() as u32;
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let mut pages_dictionary = pages_object
        .as_dict()
        .context("page tree root is not a dictionary")?
        .clone();
    pages_dictionary.set("Count", page_count as i64);
    pages_dictionary.set("Kids", kids);
    pages_dictionary.remove(b"Parent");
    for key in INHERITABLE_PAGE_KEYS {
        pages_dictionary.remove(key);
    }
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dictionary));

    let mut catalog_dictionary = catalog_object
        .as_dict()
        .context("catalog is not a dictionary")?
        .clone();
    catalog_dictionary.set("Pages", pages_id);
    catalog_dictionary.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dictionary));

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged
        .objects
        .keys()
        .map(|(id, _)| *id)
        .max()
        .unwrap_or_default();
    merged.renumber_objects();
    merged.compress();

    merged
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(page_count)
}
