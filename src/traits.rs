//! Extension traits for the two external collaborators of a sync run.
//!
//! ```text
//! ┌────────────┐  TreeEntry   ┌────────────────┐  DocumentRef  ┌────────────────┐
//! │ TreeSource │────────────▶│ DocumentFilter │─────────────▶│ FragmentSource │
//! │ (GitHub)   │              └────────────────┘               │ (HTTP)         │
//! └────────────┘                                               └───────┬────────┘
//!                                                                      ▼
//!                                                        Orchestrator (schema + upsert)
//! ```
//!
//! The built-in implementations are
//! [`GitHubTreeSource`](crate::connector_github::GitHubTreeSource) and
//! [`HttpFragmentSource`](crate::fetch::HttpFragmentSource). Tests and
//! embedders can implement the traits directly.

use anyhow::Result;
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use idx_sync_core::models::DocumentFragment;

use crate::config::SourceConfig;

/// One node of the scanned content tree.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    /// `"blob"` for files; anything else is ignored.
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: "blob".to_string(),
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// A document selected for synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Path inside the content tree, e.g. `docs/intro.md`.
    pub source_path: String,
    /// Path of the index fragment, e.g. `docs/intro.idx.json`.
    pub fragment_path: String,
    /// Row key written to every table, e.g. `/owner/repo/docs/intro.idx.json`.
    pub key: String,
}

impl DocumentRef {
    /// Derive the fragment path and row key for `source_path`.
    ///
    /// Only a trailing extension is replaced, never one in the middle of
    /// the name.
    pub fn new(owner: &str, repo: &str, source_path: &str, fragment_suffix: &str) -> Self {
        let stem = match source_path.rfind('.') {
            Some(dot) if !source_path[dot..].contains('/') => &source_path[..dot],
            _ => source_path,
        };
        let fragment_path = format!("{}{}", stem, fragment_suffix);
        let key = format!("/{}/{}/{}", owner, repo, fragment_path);
        Self {
            source_path: source_path.to_string(),
            fragment_path,
            key,
        }
    }
}

/// Selects candidate documents from a tree scan.
///
/// A candidate is a blob that has a recognized extension, is not under an
/// excluded prefix or glob, and contains the optional path filter.
pub struct DocumentFilter {
    extensions: Vec<String>,
    exclude_prefixes: Vec<String>,
    exclude_globs: GlobSet,
    path_filter: Option<String>,
}

impl DocumentFilter {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            exclude_prefixes: config.exclude_prefixes.clone(),
            exclude_globs: build_globset(&config.exclude_globs)?,
            path_filter: config.path_filter.clone().filter(|f| !f.is_empty()),
        })
    }

    pub fn accepts(&self, entry: &TreeEntry) -> bool {
        if !entry.is_blob() {
            return false;
        }
        let path = entry.path.as_str();
        if self.exclude_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        let has_extension = self.extensions.iter().any(|ext| {
            path.strip_suffix(ext.as_str())
                .map(|rest| rest.ends_with('.'))
                .unwrap_or(false)
        });
        if !has_extension {
            return false;
        }
        if self.exclude_globs.is_match(path) {
            return false;
        }
        match &self.path_filter {
            Some(filter) => path.contains(filter.as_str()),
            None => true,
        }
    }

    /// Filter a scan down to document references, in scan order.
    pub fn select(&self, entries: &[TreeEntry], config: &SourceConfig, suffix: &str) -> Vec<DocumentRef> {
        entries
            .iter()
            .filter(|e| self.accepts(e))
            .map(|e| DocumentRef::new(&config.owner, &config.repo, &e.path, suffix))
            .collect()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Enumerates the document tree of a content repository.
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// Label for logs, e.g. `"owner/repo@sha"`.
    fn describe(&self) -> String;

    async fn scan(&self) -> Result<Vec<TreeEntry>>;
}

/// Retrieves the index fragment of one document.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Fetch and parse the fragment; the result's `path` is `doc.key`.
    async fn fetch(&self, doc: &DocumentRef) -> Result<DocumentFragment>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(path_filter: Option<&str>, globs: &[&str]) -> (DocumentFilter, SourceConfig) {
        let config = SourceConfig {
            owner: "o".to_string(),
            repo: "r".to_string(),
            path_filter: path_filter.map(String::from),
            exclude_globs: globs.iter().map(|s| s.to_string()).collect(),
            ..SourceConfig::default()
        };
        (DocumentFilter::from_config(&config).unwrap(), config)
    }

    #[test]
    fn document_ref_replaces_trailing_extension_only() {
        let doc = DocumentRef::new("o", "r", "docs/my.md.notes.md", ".idx.json");
        assert_eq!(doc.fragment_path, "docs/my.md.notes.idx.json");
        assert_eq!(doc.key, "/o/r/docs/my.md.notes.idx.json");
        assert_eq!(doc.source_path, "docs/my.md.notes.md");
    }

    #[test]
    fn document_ref_ignores_dots_in_directories() {
        let doc = DocumentRef::new("o", "r", "v1.2/README", ".idx.json");
        assert_eq!(doc.fragment_path, "v1.2/README.idx.json");
    }

    #[test]
    fn accepts_markdown_blobs_only() {
        let (f, _) = filter(None, &[]);
        assert!(f.accepts(&TreeEntry::blob("index.md")));
        assert!(f.accepts(&TreeEntry::blob("docs/a.md")));
        assert!(!f.accepts(&TreeEntry::blob("docs/a.txt")));
        assert!(!f.accepts(&TreeEntry::blob("docs/amd")));
        assert!(!f.accepts(&TreeEntry {
            path: "docs.md".to_string(),
            kind: "tree".to_string(),
        }));
    }

    #[test]
    fn excludes_prefixes_and_globs() {
        let (f, _) = filter(None, &["**/drafts/**"]);
        assert!(!f.accepts(&TreeEntry::blob(".github/ISSUE.md")));
        assert!(!f.accepts(&TreeEntry::blob("docs/drafts/wip.md")));
        assert!(f.accepts(&TreeEntry::blob("docs/final.md")));
    }

    #[test]
    fn path_filter_is_substring() {
        let (f, config) = filter(Some("blog/"), &[]);
        let entries = vec![
            TreeEntry::blob("blog/post.md"),
            TreeEntry::blob("docs/post.md"),
            TreeEntry::blob("old/blog/post.md"),
        ];
        let docs = f.select(&entries, &config, ".idx.json");
        let paths: Vec<&str> = docs.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(paths, vec!["blog/post.md", "old/blog/post.md"]);
        assert_eq!(docs[0].key, "/o/r/blog/post.idx.json");
    }
}
