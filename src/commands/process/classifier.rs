use anyhow::{Result, bail};

use crate::config::ClassificationRule;
use crate::model::ClassificationDecision;

pub(crate) const DEFAULT_GROUP_SIZE: u32 = 1;

/// Maps a source filename to the number of pages that make up one student document.
#[derive(Debug, Clone)]
pub(crate) struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    pub(crate) fn new(rules: Vec<ClassificationRule>) -> Result<Self> {
        for rule in &rules {
            if rule.group_size == 0 {
                bail!("classification rule '{}' has group_size 0", rule.name);
            }
        }
        Ok(Self { rules })
    }

    pub(crate) fn classify(&self, filename: &str) -> ClassificationDecision {
        self.rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|keyword| !keyword.is_empty() && filename.contains(keyword.as_str()))
            })
            .map(|rule| ClassificationDecision {
                rule: Some(rule.name.clone()),
                group_size: rule.group_size,
            })
            .unwrap_or(ClassificationDecision {
                rule: None,
                group_size: DEFAULT_GROUP_SIZE,
            })
    }

    pub(crate) fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn rule(name: &str, keywords: &[&str], group_size: u32) -> ClassificationRule {
        ClassificationRule {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            group_size,
        }
    }

    #[test]
    fn unmatched_filename_uses_single_page_groups() {
        let classifier = Classifier::new(PipelineConfig::default().rules).expect("classifier");
        let decision = classifier.classify("3_Science_Period2.pdf");

        assert_eq!(decision.group_size, 1);
        assert_eq!(decision.rule_label(), "default");
    }

    #[test]
    fn keyword_substring_selects_rule() {
        let classifier = Classifier::new(PipelineConfig::default().rules).expect("classifier");
        let decision = classifier.classify("2_WL_French_T2.pdf");

        assert_eq!(decision.group_size, 2);
        assert_eq!(decision.rule.as_deref(), Some("two_page_reports"));
    }

    #[test]
    fn earlier_rule_wins_when_two_rules_match() {
        let classifier = Classifier::new(vec![
            rule("three_page", &["Habits"], 3),
            rule("two_page", &["Math2"], 2),
        ])
        .expect("classifier");

        let decision = classifier.classify("1_Math2_Habits.pdf");
        assert_eq!(decision.group_size, 3);
        assert_eq!(decision.rule.as_deref(), Some("three_page"));

        let reordered = Classifier::new(vec![
            rule("two_page", &["Math2"], 2),
            rule("three_page", &["Habits"], 3),
        ])
        .expect("classifier");
        assert_eq!(reordered.classify("1_Math2_Habits.pdf").group_size, 2);
    }

    #[test]
    fn matching_is_case_sensitive_and_ignores_empty_keywords() {
        let classifier =
            Classifier::new(vec![rule("two_page", &["", "Math2"], 2)]).expect("classifier");

        assert_eq!(classifier.classify("1_math2.pdf").group_size, 1);
        assert_eq!(classifier.classify("1_Math2.pdf").group_size, 2);
    }

    #[test]
    fn zero_group_size_is_rejected() {
        assert!(Classifier::new(vec![rule("broken", &["Math2"], 0)]).is_err());
    }
}
