//! Element library layout and browsing
//!
//! **Why**: Both libraries (global and show) share one on-disk layout, so every
//! path the core touches is derived here instead of being glued together ad hoc.
//!
//! **Used by**: CopyEngine, Ingestor, thumbnail generation, CLI listing
//!
//! # Layout
//!
//! ```text
//! <root>/<category>/<element>/<frames...>
//! <root>/<category>/<element>/<element>.json      sidecar
//! <root>/<category>/_thumbnails/<element>.gif     preview
//! <root>/<category>/_thumbnails/mov/<element>.mov thumbnail render
//! ```

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Folder holding previews next to the elements of a category
pub const THUMBNAIL_DIR: &str = "_thumbnails";

/// Folders that never count as categories or elements
pub const IGNORED_DIRS: &[&str] = &["contactsheet", "_catalogs", "thumbnails", "_thumbnails"];

/// Which library an element is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    /// Shared library, read-only from the show's point of view
    Global,
    /// Per-show copy elements get materialized into
    Show,
}

impl LibraryKind {
    /// Node label suffix marking the provenance
    pub fn label(&self) -> &'static str {
        match self {
            LibraryKind::Global => "global lib",
            LibraryKind::Show => "show lib",
        }
    }

    /// Node tile colour (0xRRGGBBAA) marking the provenance
    pub fn tile_color(&self) -> u32 {
        match self {
            LibraryKind::Global => 0xFF00_FF00,
            LibraryKind::Show => 0x0081_9EFF,
        }
    }

    pub fn other(&self) -> LibraryKind {
        match self {
            LibraryKind::Global => LibraryKind::Show,
            LibraryKind::Show => LibraryKind::Global,
        }
    }
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryKind::Global => write!(f, "Global Library"),
            LibraryKind::Show => write!(f, "Show Library"),
        }
    }
}

pub fn category_dir(root: &Path, category: &str) -> PathBuf {
    root.join(category)
}

pub fn element_dir(root: &Path, category: &str, name: &str) -> PathBuf {
    root.join(category).join(name)
}

pub fn thumbnail_dir(root: &Path, category: &str) -> PathBuf {
    root.join(category).join(THUMBNAIL_DIR)
}

/// Animated preview of an element (may not exist yet)
pub fn preview_path(root: &Path, category: &str, name: &str) -> PathBuf {
    thumbnail_dir(root, category).join(format!("{}.gif", name))
}

/// Movie written by a thumbnail-setup chain
pub fn preview_movie_path(root: &Path, category: &str, name: &str) -> PathBuf {
    thumbnail_dir(root, category).join("mov").join(format!("{}.mov", name))
}

/// Preview path if the preview exists on disk
pub fn existing_preview(root: &Path, category: &str, name: &str) -> Option<PathBuf> {
    let path = preview_path(root, category, name);
    path.is_file().then_some(path)
}

/// Sorted sub-directory names of `dir`, minus [`IGNORED_DIRS`]
///
/// A missing directory is logged and yields an empty list.
pub fn subdirs(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Can not list directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !IGNORED_DIRS.contains(&name.as_str()))
        .collect();
    dirs.sort();
    dirs
}

pub fn categories(root: &Path) -> Vec<String> {
    subdirs(root)
}

pub fn elements(root: &Path, category: &str) -> Vec<String> {
    subdirs(&category_dir(root, category))
}

/// Case-insensitive substring filter over element names
pub fn search<S: AsRef<str>>(names: &[S], text: &str) -> Vec<String> {
    let needle = text.to_lowercase();
    names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| n.to_lowercase().contains(&needle))
        .map(str::to_string)
        .collect()
}
