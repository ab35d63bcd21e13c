//! Image sequence detection for element folders
//!
//! **Why**: Element folders are not curated. Next to the real frames there can be
//! contact sheets, partial re-renders and numbered temp files. Ingestion needs
//! exactly one sequence per folder, so the longest one wins.
//!
//! **Used by**: CopyEngine (what to copy), Ingestor (read pattern and range),
//! thumbnail generation (which frames to sample)
//!
//! # Detection Algorithm
//!
//! 1. Keep raster images only (`exr png jpg jpeg tif tiff hdr`)
//! 2. Sort names lexically, scan in order, skip names already covered by a candidate prefix
//! 3. Strip trailing digits: `smoke.0001.exr` → base `smoke`, separator `.`, padding 4
//! 4. Count every file matching `<base><sep>*.<ext>`
//! 5. Highest count wins, first candidate wins ties
//!
//! # Frame Numbering
//!
//! - Dot: `smoke.0001.exr` → `smoke.%04d.exr`
//! - Suffix: `smoke_0001.exr` → `smoke_%04d.exr`, `smoke0001.exr` → `smoke%04d.exr`
//! - Unnumbered: `splash.png` is a single still, count 1
//!
//! Counting is gap-blind: `end = start + count - 1` assumes every frame in the
//! range exists on disk.

use std::path::{Path, PathBuf};

use glob::Pattern;
use indexmap::IndexMap;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raster formats considered part of an element
pub const IMAGE_EXTENSIONS: &[&str] = &["exr", "png", "jpg", "jpeg", "tif", "tiff", "hdr"];

static FRAME_FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%0(\d+)d").expect("frame format regex is valid"));

/// Sequence detection errors
#[derive(Debug)]
pub enum SequenceError {
    /// Listing holds no image file of a known format
    NoSequenceFound(String),
    Io(String),
    Image(String),
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::NoSequenceFound(what) => write!(f, "No image sequence found in {}", what),
            SequenceError::Io(e) => write!(f, "IO error: {}", e),
            SequenceError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for SequenceError {}

/// How frame numbers are embedded in file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Numbering {
    /// `base.0001.ext`
    Dot,
    /// `base_0001.ext`, `base-0001.ext` or `base0001.ext`
    Suffix,
    /// Single still without a frame number
    Unnumbered,
}

/// One inferred image sequence inside a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    pub base: String,       // "smoke" for smoke.0001.exr
    pub separator: String,  // ".", "_", "-" or "" when digits are glued to the name
    pub padding: usize,     // 4 for "0001", 0 for stills
    pub extension: String,  // without the dot, case preserved
    pub count: usize,
    pub start: i64,
    pub end: i64,
    pub numbering: Numbering,
    pub pattern: String,    // "smoke.%04d.exr" or "splash.png"
}

impl SequenceDescriptor {
    /// `None` when the frame range does not fit in `i64`
    fn numbered(base: &str, separator: &str, digits: &str, extension: &str, start: i64, count: usize) -> Option<Self> {
        let end = i64::try_from(count).ok().and_then(|n| start.checked_add(n - 1))?;
        let padding = digits.len();
        let numbering = if separator == "." { Numbering::Dot } else { Numbering::Suffix };
        let pattern = format!("{}{}%0{}d.{}", base, separator, padding, extension);
        Some(Self {
            base: base.to_string(),
            separator: separator.to_string(),
            padding,
            extension: extension.to_string(),
            count,
            start,
            end,
            numbering,
            pattern,
        })
    }

    fn still(stem: &str, extension: &str) -> Self {
        Self {
            base: stem.to_string(),
            separator: String::new(),
            padding: 0,
            extension: extension.to_string(),
            count: 1,
            start: 0,
            end: 0,
            numbering: Numbering::Unnumbered,
            pattern: format!("{}.{}", stem, extension),
        }
    }

    pub fn is_numbered(&self) -> bool {
        self.numbering != Numbering::Unnumbered
    }

    /// printf-style frame token, `"None"` for stills
    pub fn frame_format(&self) -> String {
        match self.numbering {
            Numbering::Unnumbered => "None".to_string(),
            _ => format!("%0{}d", self.padding),
        }
    }

    /// Name prefix shared by every file of this sequence
    pub fn prefix(&self) -> String {
        format!("{}{}", self.base, self.separator)
    }

    /// File name of a given frame, e.g. `smoke.0042.exr`
    ///
    /// Stills ignore the frame number.
    pub fn frame_name(&self, frame: i64) -> String {
        if !self.is_numbered() {
            return self.pattern.clone();
        }
        FRAME_FORMAT_RE
            .replace(&self.pattern, format!("{:0width$}", frame, width = self.padding).as_str())
            .to_string()
    }

    pub fn frame_path(&self, dir: &Path, frame: i64) -> PathBuf {
        dir.join(self.frame_name(frame))
    }

    /// Full read pattern inside `dir`, e.g. `/lib/fx/smoke/smoke.%04d.exr`
    pub fn pattern_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.pattern)
    }

    /// Frame number encoded in `name` if it belongs to this sequence
    pub fn frame_of(&self, name: &str) -> Option<i64> {
        if !self.is_numbered() {
            return (name == self.pattern).then_some(self.start);
        }
        let rest = name.strip_prefix(self.prefix().as_str())?;
        let digits = rest.strip_suffix(format!(".{}", self.extension).as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Members of this sequence found in `names`, sorted by frame number
    pub fn member_frames<S: AsRef<str>>(&self, names: &[S]) -> Vec<(i64, String)> {
        let mut frames: Vec<(i64, String)> = names
            .iter()
            .filter_map(|n| self.frame_of(n.as_ref()).map(|f| (f, n.as_ref().to_string())))
            .collect();
        frames.sort();
        frames
    }

    /// Image resolution from the first frame header
    pub fn resolution(&self, dir: &Path) -> Result<(u32, u32), SequenceError> {
        let path = self.frame_path(dir, self.start);
        let reader = image::ImageReader::open(&path)
            .map_err(|e| SequenceError::Image(format!("{}: {}", path.display(), e)))?;
        reader
            .with_guessed_format()
            .map_err(|e| SequenceError::Image(format!("{}: {}", path.display(), e)))?
            .into_dimensions()
            .map_err(|e| SequenceError::Image(format!("{}: {}", path.display(), e)))
    }
}

/// True for file names with an allowed raster extension
pub fn is_image(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Split `stem` into (name part, separator, trailing digits)
///
/// Example: "smoke_0001" -> ("smoke", "_", "0001"), "smoke0001" -> ("smoke", "", "0001")
fn split_frame_number(stem: &str) -> Option<(&str, &str, &str)> {
    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let digits = &stem[digit_start..];
    let head = &stem[..digit_start];
    match head.chars().last() {
        Some(c) if !c.is_alphanumeric() => {
            let sep_start = head.len() - c.len_utf8();
            Some((&head[..sep_start], &head[sep_start..], digits))
        }
        _ => Some((head, "", digits)),
    }
}

/// Build all candidate sequences from a directory listing
///
/// Candidates come back in discovery order (lexical order of their first file).
pub fn candidates<S: AsRef<str>>(names: &[S]) -> Result<Vec<SequenceDescriptor>, SequenceError> {
    let mut listing: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    listing.sort_unstable();

    let mut found: IndexMap<String, SequenceDescriptor> = IndexMap::new();
    let mut covered: Vec<String> = Vec::new();

    for name in listing.iter().copied() {
        if covered.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }
        if !is_image(name) {
            continue;
        }
        let Some((stem, ext)) = name.rsplit_once('.') else {
            continue;
        };

        let numbered = split_frame_number(stem)
            .and_then(|(base, sep, digits)| digits.parse::<i64>().ok().map(|n| (base, sep, digits, n)));

        let desc = match numbered {
            Some((base, sep, digits, start)) => {
                let mask = format!("{}*.{}", Pattern::escape(&format!("{}{}", base, sep)), Pattern::escape(ext));
                let count = match Pattern::new(&mask) {
                    Ok(pattern) => listing.iter().filter(|n| pattern.matches(n)).count(),
                    Err(e) => {
                        debug!("Bad sequence mask {}: {}", mask, e);
                        1
                    }
                };
                SequenceDescriptor::numbered(base, sep, digits, ext, start, count).unwrap_or_else(|| {
                    debug!("Frame range of {} overflows, treating it as a still", name);
                    SequenceDescriptor::still(stem, ext)
                })
            }
            None => SequenceDescriptor::still(stem, ext),
        };

        let prefix = desc.prefix();
        if !prefix.is_empty() {
            covered.push(prefix);
        }
        debug!("Candidate {} ({} frames)", desc.pattern, desc.count);
        found.insert(desc.base.clone(), desc);
    }

    Ok(found.into_values().collect())
}

/// Pick the authoritative (longest) sequence from a directory listing
pub fn longest<S: AsRef<str>>(names: &[S]) -> Result<SequenceDescriptor, SequenceError> {
    let mut best: Option<SequenceDescriptor> = None;
    for desc in candidates(names)? {
        if best.as_ref().is_none_or(|b| desc.count > b.count) {
            best = Some(desc);
        }
    }
    best.ok_or_else(|| SequenceError::NoSequenceFound(format!("{} listed files", names.len())))
}

/// File names inside `dir` (non-UTF-8 names are skipped)
pub fn list_dir(dir: &Path) -> Result<Vec<String>, SequenceError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| SequenceError::Io(format!("Failed to read dir {}: {}", dir.display(), e)))?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!("Skipping non UTF-8 name {:?} in {}", raw, dir.display()),
        }
    }
    Ok(names)
}

/// List `dir` and return its authoritative sequence
pub fn detect_in_dir(dir: &Path) -> Result<SequenceDescriptor, SequenceError> {
    let names = list_dir(dir)?;
    let desc = longest(&names).map_err(|e| match e {
        SequenceError::NoSequenceFound(_) => SequenceError::NoSequenceFound(dir.display().to_string()),
        other => other,
    })?;
    info!(
        "Sequence: {} ({} frames, {}-{}) in {}",
        desc.pattern,
        desc.count,
        desc.start,
        desc.end,
        dir.display()
    );
    Ok(desc)
}
