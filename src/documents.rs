//! Filesystem document source.
//!
//! Walks the configured roots and lists every file that matches the include
//! globs, skipping hidden files and directories. Globs are matched against
//! the path relative to its root; the document key is the path as walked
//! (root joined with the relative path).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use memdex_core::models::DocumentMeta;
use memdex_core::sync::DocumentSource;

use crate::config::DocumentsConfig;

/// Lists and reads markdown files under one or more root directories.
pub struct FsDocumentSource {
    roots: Vec<PathBuf>,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FsDocumentSource {
    pub fn new(config: &DocumentsConfig) -> Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());

        Ok(Self {
            roots: config.roots.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn list_root(&self, root: &Path, out: &mut Vec<DocumentMeta>) {
        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy();

            if self.exclude.is_match(rel_str.as_ref()) || !self.include.is_match(rel_str.as_ref()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file without metadata");
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

            out.push(DocumentMeta {
                path: path.to_string_lossy().to_string(),
                last_modified: DateTime::<Utc>::from(modified),
                size_bytes: metadata.len(),
            });
        }
    }
}

impl DocumentSource for FsDocumentSource {
    fn list(&self) -> Result<Vec<DocumentMeta>> {
        let mut docs = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                debug!(root = %root.display(), "document root does not exist, skipping");
                continue;
            }
            self.list_root(root, &mut docs);
        }

        // Sort for deterministic ordering
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        docs.dedup_by(|a, b| a.path == b.path);
        Ok(docs)
    }

    fn read(&self, path: &str) -> Result<String> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source_for(roots: Vec<PathBuf>) -> FsDocumentSource {
        FsDocumentSource::new(&DocumentsConfig {
            roots,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn lists_markdown_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("memory");
        fs::create_dir_all(root.join("daily")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::write(root.join("MEMORY.md"), "# Memory").unwrap();
        fs::write(root.join("daily/2024-05-01.md"), "shipped").unwrap();
        fs::write(root.join("notes.txt"), "not markdown").unwrap();
        fs::write(root.join(".draft.md"), "hidden").unwrap();
        fs::write(root.join(".obsidian/workspace.md"), "hidden dir").unwrap();

        let docs = source_for(vec![root.clone()]).list().unwrap();
        let names: Vec<String> = docs
            .iter()
            .map(|d| {
                Path::new(&d.path)
                    .strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["MEMORY.md", "daily/2024-05-01.md"]);
        assert_eq!(docs[0].size_bytes, 8);
    }

    #[test]
    fn missing_roots_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let present = tmp.path().join("memory");
        fs::create_dir_all(&present).unwrap();
        fs::write(present.join("a.md"), "a").unwrap();

        let docs = source_for(vec![tmp.path().join("nope"), present]).list().unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn exclude_globs_apply() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("archive")).unwrap();
        fs::write(root.join("keep.md"), "k").unwrap();
        fs::write(root.join("archive/old.md"), "o").unwrap();

        let src = FsDocumentSource::new(&DocumentsConfig {
            roots: vec![root],
            exclude_globs: vec!["archive/**".into()],
            ..Default::default()
        })
        .unwrap();
        let docs = src.list().unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path.ends_with("keep.md"));
    }

    #[test]
    fn read_replaces_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.md");
        fs::write(&file, b"ok \xff\xfe end").unwrap();
        let text = source_for(vec![]).read(&file.to_string_lossy()).unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" end"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn read_missing_file_errors() {
        assert!(source_for(vec![]).read("/definitely/not/here.md").is_err());
    }

    #[test]
    fn invalid_glob_rejected() {
        let err = FsDocumentSource::new(&DocumentsConfig {
            include_globs: vec!["[".into()],
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("invalid glob"));
    }
}
