// src/catalog.rs
//! Fixture discovery.
//!
//! Walks the corpus root and derives one `TestDescriptor` per fixture file.
//! Ordering is lexicographic on the full path so that repeated runs report
//! in the same order byte-for-byte.

use crate::error::{HarnessError, Result};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Identity of one fixture in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDescriptor {
    /// First path segment below the corpus root.
    pub category: String,
    /// Second segment, or empty when the fixture sits directly in its
    /// category directory.
    pub subcategory: String,
    /// Filename without extension.
    pub test_id: String,
    pub fixture_path: PathBuf,
}

/// Discovers all fixtures under `corpus_root`, sorted lexicographically by
/// full path. An empty corpus is not an error.
///
/// # Errors
/// Returns `CorpusRoot` if the root does not exist or cannot be read.
pub fn discover(corpus_root: &Path) -> Result<Vec<TestDescriptor>> {
    // Surface unreadable roots up front; WalkDir would otherwise yield a
    // single error entry and look like an empty corpus.
    std::fs::read_dir(corpus_root).map_err(|source| HarnessError::CorpusRoot {
        path: corpus_root.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = WalkDir::new(corpus_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()))
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .filter_map(|p| describe(corpus_root, p))
        .collect())
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name.len() > 1
}

/// Derives the `(category, subcategory, test_id)` triple from a fixture's
/// path relative to the corpus root.
fn describe(corpus_root: &Path, path: PathBuf) -> Option<TestDescriptor> {
    let rel = path.strip_prefix(corpus_root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let test_id = path.file_stem()?.to_string_lossy().into_owned();

    // segments always ends with the filename itself
    let (category, subcategory) = match segments.len() {
        0 | 1 => ("uncategorized".to_string(), String::new()),
        2 => (segments[0].clone(), String::new()),
        _ => (segments[0].clone(), segments[1].clone()),
    };

    Some(TestDescriptor {
        category,
        subcategory,
        test_id,
        fixture_path: path,
    })
}
