use std::path::Path;

use anyhow::Result;

use super::text_extract::TextExtractor;
use crate::error::PipelineError;
use crate::model::Identity;

/// Lines the first page layout must provide; only the first two are used.
const IDENTITY_FIELD_COUNT: usize = 4;

/// Leading class-label token that pushes the class code to the second token.
const GRADE_LEVEL_TOKEN: &str = "6th";

pub(crate) fn extract_identity(extractor: &dyn TextExtractor, segment_path: &Path) -> Result<Identity> {
    let segment = segment_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| segment_path.display().to_string());
    let text = extractor.extract_text(segment_path)?;
    Ok(parse_identity(&segment, &text)?)
}

/// Parses `name\nclass label\n...` into an [`Identity`].
///
/// `segment` is only used as error context.
pub(crate) fn parse_identity(segment: &str, text: &str) -> Result<Identity, PipelineError> {
    let fields = text.splitn(IDENTITY_FIELD_COUNT, '\n').collect::<Vec<&str>>();
    if fields.len() < IDENTITY_FIELD_COUNT {
        return Err(PipelineError::malformed(
            segment,
            format!(
                "expected at least {IDENTITY_FIELD_COUNT} text lines, found {}",
                fields.len()
            ),
        ));
    }

    let full_name = fields[0].trim();
    let class_label = fields[1].trim();
    if full_name.is_empty() {
        return Err(PipelineError::malformed(segment, "first line (student name) is empty"));
    }
    if class_label.is_empty() {
        return Err(PipelineError::malformed(segment, "second line (class label) is empty"));
    }
    if !is_safe_folder_name(full_name) {
        return Err(PipelineError::malformed(
            segment,
            format!("student name '{full_name}' cannot be used as a folder name"),
        ));
    }

    let class_code = derive_class_code(class_label).ok_or_else(|| {
        PipelineError::malformed(
            segment,
            format!("class label '{class_label}' has no token after '{GRADE_LEVEL_TOKEN}'"),
        )
    })?;

    Ok(Identity {
        full_name: full_name.to_string(),
        class_label: class_label.to_string(),
        class_code,
    })
}

fn derive_class_code(class_label: &str) -> Option<String> {
    let mut tokens = class_label.split_whitespace();
    let first = tokens.next()?;
    let code = if first == GRADE_LEVEL_TOKEN {
        tokens.next()?
    } else {
        first
    };
    Some(sanitize_file_component(code))
}

fn is_safe_folder_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && !name
            .chars()
            .any(|character| matches!(character, '/' | '\\') || character.is_control())
}

/// Replaces characters that cannot appear in a file name.
fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|character| {
            if matches!(character, '/' | '\\' | ':') || character.is_control() {
                '_'
            } else {
                character
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_class_code_from_first_two_lines() {
        let identity = parse_identity("seg.pdf", "Jane Doe\nMath 101\nA\nB").expect("identity");

        assert_eq!(identity.full_name, "Jane Doe");
        assert_eq!(identity.class_label, "Math 101");
        assert_eq!(identity.class_code, "Math");
    }

    #[test]
    fn grade_level_token_shifts_class_code_to_second_token() {
        let identity =
            parse_identity("seg.pdf", "Jane Doe\n6th Period Math\nA\nB").expect("identity");

        assert_eq!(identity.class_code, "Period");
    }

    #[test]
    fn trailing_text_after_fourth_line_is_ignored() {
        let identity = parse_identity(
            "seg.pdf",
            "John Smith\r\nScience Lab\r\nTrimester 2\nStandard 1\nStandard 2\n",
        )
        .expect("identity");

        assert_eq!(identity.full_name, "John Smith");
        assert_eq!(identity.class_code, "Science");
    }

    #[test]
    fn too_few_lines_is_malformed() {
        let error = parse_identity("1_Math_i_002.pdf", "Jane Doe\nMath 101\nA").expect_err("short");

        match error {
            PipelineError::MalformedIdentityText { segment, reason } => {
                assert_eq!(segment, "1_Math_i_002.pdf");
                assert!(reason.contains("found 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_leading_line_is_malformed() {
        assert!(matches!(
            parse_identity("seg.pdf", "\nMath 101\nA\nB"),
            Err(PipelineError::MalformedIdentityText { .. })
        ));
        assert!(matches!(
            parse_identity("seg.pdf", "Jane Doe\n   \nA\nB"),
            Err(PipelineError::MalformedIdentityText { .. })
        ));
    }

    #[test]
    fn bare_grade_level_token_is_malformed() {
        assert!(matches!(
            parse_identity("seg.pdf", "Jane Doe\n6th\nA\nB"),
            Err(PipelineError::MalformedIdentityText { .. })
        ));
    }

    #[test]
    fn path_separators_in_name_are_rejected() {
        assert!(matches!(
            parse_identity("seg.pdf", "../etc\nMath 101\nA\nB"),
            Err(PipelineError::MalformedIdentityText { .. })
        ));
    }

    #[test]
    fn class_code_is_made_file_safe() {
        let identity = parse_identity("seg.pdf", "Jane Doe\nArt/Design 2\nA\nB").expect("identity");
        assert_eq!(identity.class_code, "Art_Design");
    }

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract_text(&self, _pdf_path: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn extract_identity_reports_segment_file_name() {
        let error = extract_identity(&FixedText("only one line"), Path::new("/tmp/x/2_Art_i_004.pdf"))
            .expect_err("malformed");

        assert!(error.to_string().contains("2_Art_i_004.pdf"));
        assert!(matches!(
            error.downcast_ref::<PipelineError>(),
            Some(PipelineError::MalformedIdentityText { .. })
        ));
    }
}
