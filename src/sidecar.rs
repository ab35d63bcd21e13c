//! Per-element JSON sidecar: centering curve plus summary attributes
//!
//! **Why**: Elements like sparks or debris drift across frame. The sidecar records
//! where the interesting part sits (optionally per frame) so ingestion can build a
//! transform that stabilizes it in the middle of the frame.
//!
//! **Used by**: Ingestor (Centered modes), metadata authoring ("write data")
//!
//! # File
//!
//! `<element_dir>/<element_name>.json`:
//!
//! ```json
//! {
//!   "element_name": "sparks_a",
//!   "element_dir": "/lib/fx/sparks_a",
//!   "start": 1, "end": 48, "duration": 47,
//!   "width": 1920, "height": 1080,
//!   "source_point": { "0": [960.0, 540.0] }
//! }
//! ```
//!
//! Key `0` alone means a static point. Writes overwrite; there is no merge and no locking.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::sequence::SequenceDescriptor;

/// Image-space coordinate pair
pub type Point = [f64; 2];

/// Sidecar errors
#[derive(Debug)]
pub enum SidecarError {
    /// No sidecar on disk: callers fall back to the image center
    NotFound(PathBuf),
    Parse(String),
    Io(String),
}

impl SidecarError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SidecarError::NotFound(_))
    }
}

impl std::fmt::Display for SidecarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SidecarError::NotFound(path) => write!(f, "No sidecar at {}", path.display()),
            SidecarError::Parse(e) => write!(f, "Sidecar parse error: {}", e),
            SidecarError::Io(e) => write!(f, "Sidecar IO error: {}", e),
        }
    }
}

impl std::error::Error for SidecarError {}

/// Source point per frame, or a single static point under key 0
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CenterCurve {
    points: BTreeMap<i64, Point>,
}

/// One key of a centering transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterKey {
    pub frame: i64,
    /// Offset moving the source point onto the frame center
    pub translate: Point,
    /// Pivot of the transform (the source point itself)
    pub center: Point,
}

impl CenterCurve {
    /// Non-animated curve
    pub fn fixed(point: Point) -> Self {
        let mut points = BTreeMap::new();
        points.insert(0, point);
        Self { points }
    }

    /// Curve from explicit (frame, point) keys
    pub fn from_keys(keys: impl IntoIterator<Item = (i64, Point)>) -> Self {
        Self { points: keys.into_iter().collect() }
    }

    /// Bake a point source over `start..=end`, one key per frame
    pub fn sampled(start: i64, end: i64, mut point_at: impl FnMut(i64) -> Point) -> Self {
        Self::from_keys((start..=end).map(|f| (f, point_at(f))))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// More than one key means per-frame animation
    pub fn is_animated(&self) -> bool {
        self.points.len() > 1
    }

    /// Keys in ascending frame order
    pub fn keys(&self) -> impl Iterator<Item = (i64, Point)> + '_ {
        self.points.iter().map(|(f, p)| (*f, *p))
    }

    /// Point in effect at `frame`
    ///
    /// Static curves answer the same point for every frame. Animated curves hold
    /// the closest earlier key and clamp to the first key before the range.
    pub fn point_at(&self, frame: i64) -> Option<Point> {
        if !self.is_animated() {
            return self.points.values().next().copied();
        }
        self.points
            .range(..=frame)
            .next_back()
            .or_else(|| self.points.iter().next())
            .map(|(_, p)| *p)
    }

    /// Transform keys that move the source point onto `frame_center`
    pub fn centering_keys(&self, frame_center: Point) -> Vec<CenterKey> {
        self.keys()
            .map(|(frame, p)| CenterKey {
                frame,
                translate: [frame_center[0] - p[0], frame_center[1] - p[1]],
                center: p,
            })
            .collect()
    }
}

/// Everything stored in a sidecar file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSidecar {
    pub element_name: String,
    pub element_dir: PathBuf,
    pub start: i64,
    pub end: i64,
    pub duration: i64,
    pub width: u32,
    pub height: u32,
    pub source_point: CenterCurve,
}

impl ElementSidecar {
    /// Summary for a detected element; `source_point` defaults to the image center
    pub fn from_descriptor(
        element_dir: &Path,
        element_name: &str,
        desc: &SequenceDescriptor,
        (width, height): (u32, u32),
        source_point: Option<CenterCurve>,
    ) -> Self {
        let center = image_center(width, height);
        Self {
            element_name: element_name.to_string(),
            element_dir: element_dir.to_path_buf(),
            start: desc.start,
            end: desc.end,
            duration: desc.end - desc.start,
            width,
            height,
            source_point: source_point.unwrap_or_else(|| CenterCurve::fixed(center)),
        }
    }

    pub fn center(&self) -> Point {
        image_center(self.width, self.height)
    }

    pub fn path(&self) -> PathBuf {
        SidecarStore::path(&self.element_dir, &self.element_name)
    }
}

/// Geometric center of a `width` x `height` image
pub fn image_center(width: u32, height: u32) -> Point {
    [width as f64 / 2.0, height as f64 / 2.0]
}

/// Where a resolved centering curve came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveSource {
    Sidecar,
    /// No sidecar on disk
    ImageCenter,
    /// Sidecar existed but could not be used
    ImageCenterAfterError(String),
}

/// Reads and writes sidecar files
pub struct SidecarStore;

impl SidecarStore {
    /// `<element_dir>/<element_name>.json`
    pub fn path(element_dir: &Path, element_name: &str) -> PathBuf {
        element_dir.join(Self::file_name(element_name))
    }

    pub fn file_name(element_name: &str) -> String {
        format!("{}.json", element_name)
    }

    /// Serialize to the sidecar path, replacing any previous file
    pub fn write(sidecar: &ElementSidecar) -> Result<PathBuf, SidecarError> {
        let path = sidecar.path();
        let json = serde_json::to_string_pretty(sidecar)
            .map_err(|e| SidecarError::Parse(format!("Serialize {}: {}", path.display(), e)))?;
        fs::write(&path, json).map_err(|e| SidecarError::Io(format!("Write {}: {}", path.display(), e)))?;
        info!("Sidecar written to {}", path.display());
        Ok(path)
    }

    pub fn read(element_dir: &Path, element_name: &str) -> Result<ElementSidecar, SidecarError> {
        let path = Self::path(element_dir, element_name);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SidecarError::NotFound(path)),
            Err(e) => return Err(SidecarError::Io(format!("Read {}: {}", path.display(), e))),
        };
        serde_json::from_str(&json).map_err(|e| SidecarError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Centering curve for an element, falling back to a static `image_center`
    ///
    /// Missing sidecars fall back silently. Unreadable or malformed ones fall
    /// back too but are reported through [`CurveSource::ImageCenterAfterError`].
    pub fn resolve_curve(element_dir: &Path, element_name: &str, image_center: Point) -> (CenterCurve, CurveSource) {
        match Self::read(element_dir, element_name) {
            Ok(sidecar) if !sidecar.source_point.is_empty() => {
                debug!("Centering from sidecar {}", sidecar.path().display());
                (sidecar.source_point, CurveSource::Sidecar)
            }
            Ok(sidecar) => {
                let msg = format!("{} has no source points", sidecar.path().display());
                warn!("{}", msg);
                (CenterCurve::fixed(image_center), CurveSource::ImageCenterAfterError(msg))
            }
            Err(SidecarError::NotFound(_)) => (CenterCurve::fixed(image_center), CurveSource::ImageCenter),
            Err(e) => {
                warn!("Ignoring sidecar for {}: {}", element_name, e);
                (CenterCurve::fixed(image_center), CurveSource::ImageCenterAfterError(e.to_string()))
            }
        }
    }
}
