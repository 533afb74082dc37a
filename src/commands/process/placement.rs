use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::PipelineError;
use crate::model::{Identity, Segment};
use crate::util::ensure_directory;

/// Name of a segment inside its student folder. Sorting these names restores
/// source order first, then class, then page-group order. The source stem
/// keeps sources that share an ordinal and class code apart.
pub(crate) fn placed_file_name(segment: &Segment, identity: &Identity) -> String {
    format!(
        "{}_{}_{}_{:03}.pdf",
        segment.ordinal, identity.class_code, segment.source_stem, segment.group_index
    )
}

/// Copies `segment` into `<output_root>/<full name>/` and returns the new path.
///
/// An existing destination is never overwritten.
pub(crate) fn place_segment(
    segment: &Segment,
    identity: &Identity,
    output_root: &Path,
) -> Result<PathBuf> {
    let folder = output_root.join(&identity.full_name);
    let destination = folder.join(placed_file_name(segment, identity));

    if destination.exists() {
        return Err(PipelineError::conflict(destination).into());
    }

    ensure_directory(&folder)?;
    fs::copy(&segment.path, &destination).with_context(|| {
        format!(
            "failed to copy {} to {}",
            segment.path.display(),
            destination.display()
        )
    })?;

    debug!(
        segment = %segment.file_name,
        destination = %destination.display(),
        "placed segment"
    );

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_at(path: PathBuf, ordinal: &str, group_index: u32) -> Segment {
        Segment {
            source_stem: format!("{ordinal}_Math2"),
            ordinal: ordinal.to_string(),
            group_index,
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
        }
    }

    fn identity(name: &str, class_code: &str) -> Identity {
        Identity {
            full_name: name.to_string(),
            class_label: format!("{class_code} 101"),
            class_code: class_code.to_string(),
        }
    }

    #[test]
    fn placed_names_sort_by_source_then_group() {
        let jane = identity("Jane Doe", "Math");
        let mut names = vec![
            placed_file_name(&segment_at(PathBuf::from("a.pdf"), "002", 1), &jane),
            placed_file_name(&segment_at(PathBuf::from("b.pdf"), "001", 10), &jane),
            placed_file_name(&segment_at(PathBuf::from("c.pdf"), "001", 2), &jane),
        ];
        names.sort();

        assert_eq!(
            names,
            vec![
                "001_Math_001_Math2_002.pdf",
                "001_Math_001_Math2_010.pdf",
                "002_Math_002_Math2_001.pdf",
            ]
        );
    }

    #[test]
    fn sources_sharing_an_ordinal_and_class_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jane = identity("Jane Doe", "Math");
        let mut placed = Vec::new();
        for stem in ["1_Math2", "1_Math_Enrichment"] {
            let source = dir.path().join(format!("{stem}_i_001.pdf"));
            fs::write(&source, stem.as_bytes()).expect("write");
            let segment = Segment {
                source_stem: stem.to_string(),
                ordinal: "001".to_string(),
                group_index: 1,
                file_name: format!("{stem}_i_001.pdf"),
                path: source,
            };
            placed.push(place_segment(&segment, &jane, dir.path()).expect("placed"));
        }

        assert_ne!(placed[0], placed[1]);
        assert_eq!(fs::read(&placed[1]).expect("read"), b"1_Math_Enrichment");
    }

    #[test]
    fn place_segment_copies_into_student_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("1_Math2_i_001.pdf");
        fs::write(&source, b"%PDF-1.5 segment").expect("write");
        let output_root = dir.path().join("Processed");

        let placed = place_segment(
            &segment_at(source.clone(), "001", 1),
            &identity("Jane Doe", "Math"),
            &output_root,
        )
        .expect("placed");

        assert_eq!(
            placed,
            output_root.join("Jane Doe").join("001_Math_001_Math2_001.pdf")
        );
        assert_eq!(fs::read(&placed).expect("read"), b"%PDF-1.5 segment");
        assert!(source.exists());
    }

    #[test]
    fn place_segment_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("1_Math2_i_001.pdf");
        fs::write(&source, b"new").expect("write");
        let folder = dir.path().join("Jane Doe");
        fs::create_dir_all(&folder).expect("mkdir");
        fs::write(folder.join("001_Math_001_Math2_001.pdf"), b"old").expect("write");

        let error = place_segment(
            &segment_at(source, "001", 1),
            &identity("Jane Doe", "Math"),
            dir.path(),
        )
        .expect_err("conflict");

        assert!(matches!(
            error.downcast_ref::<PipelineError>(),
            Some(PipelineError::FilesystemConflict { .. })
        ));
        assert_eq!(
            fs::read(folder.join("001_Math_001_Math2_001.pdf")).expect("read"),
            b"old"
        );
    }
}
