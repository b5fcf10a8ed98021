//! Source-label classification.
//!
//! Every chunk carries a `source_label` (for example `"memory"` or
//! `"sessions"`) derived from its document path. Labels scope queries via
//! an equality filter and never influence ranking.
//!
//! Classification is pluggable: anything implementing [`SourceClassifier`]
//! works, including plain closures. The app crate provides a glob-rule
//! classifier built from configuration.

/// Maps a document path to its source label.
pub trait SourceClassifier: Send + Sync {
    fn classify(&self, path: &str) -> String;
}

impl<F> SourceClassifier for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn classify(&self, path: &str) -> String {
        self(path)
    }
}

/// Labels every document with the same value.
#[derive(Debug, Clone)]
pub struct FixedLabel(pub String);

impl SourceClassifier for FixedLabel {
    fn classify(&self, _path: &str) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_classifiers() {
        let by_dir = |path: &str| {
            if path.contains("/session-transcripts/") {
                "sessions".to_string()
            } else {
                "memory".to_string()
            }
        };
        let c: &dyn SourceClassifier = &by_dir;
        assert_eq!(c.classify("/u/session-transcripts/2024.md"), "sessions");
        assert_eq!(c.classify("/u/memory/MEMORY.md"), "memory");
    }

    #[test]
    fn fixed_label_ignores_path() {
        let c = FixedLabel("memory".into());
        assert_eq!(c.classify("anything.md"), "memory");
    }
}
