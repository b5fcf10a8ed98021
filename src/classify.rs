//! Glob-rule source classifier.
//!
//! Built from `[classify]`: each rule maps a set of globs to a label, rules
//! are tried in order, and unmatched paths get `default_label`.

use anyhow::Result;
use globset::GlobSet;

use memdex_core::classify::SourceClassifier;

use crate::config::ClassifyConfig;
use crate::documents::build_globset;

pub struct GlobClassifier {
    rules: Vec<(String, GlobSet)>,
    default_label: String,
}

impl GlobClassifier {
    pub fn new(config: &ClassifyConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|r| Ok((r.label.clone(), build_globset(&r.globs)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            default_label: config.default_label.clone(),
        })
    }
}

impl SourceClassifier for GlobClassifier {
    fn classify(&self, path: &str) -> String {
        self.rules
            .iter()
            .find(|(_, set)| set.is_match(path))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| self.default_label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifyRule;

    #[test]
    fn default_rules_split_sessions_from_memory() {
        let c = GlobClassifier::new(&ClassifyConfig::default()).unwrap();
        assert_eq!(c.classify("./session-transcripts/2024-05-01.md"), "sessions");
        assert_eq!(c.classify("/home/u/session-transcripts/a/b.md"), "sessions");
        assert_eq!(c.classify("./memory/MEMORY.md"), "memory");
    }

    #[test]
    fn first_matching_rule_wins() {
        let cfg = ClassifyConfig {
            default_label: "other".into(),
            rules: vec![
                ClassifyRule {
                    label: "daily".into(),
                    globs: vec!["**/daily/**".into()],
                },
                ClassifyRule {
                    label: "notes".into(),
                    globs: vec!["**/*.md".into()],
                },
            ],
        };
        let c = GlobClassifier::new(&cfg).unwrap();
        assert_eq!(c.classify("memory/daily/x.md"), "daily");
        assert_eq!(c.classify("memory/x.md"), "notes");
        assert_eq!(c.classify("memory/x.txt"), "other");
    }
}
