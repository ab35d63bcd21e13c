//! Thumbnail frame sampling and preview rendering
//!
//! **Why**: Previews are short looping GIFs. Long elements are down-sampled to a
//! bounded frame set spread evenly over the whole timeline, so a 1000-frame
//! element and a 40-frame element both preview in a couple of seconds.
//!
//! **Used by**: `thumbs` CLI command, library maintenance tools
//!
//! The encoder itself is external. [`FfmpegEncoder`] is the stock adapter: an
//! ffmpeg concat list at 0.04 s/frame scaled to 256 px wide.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::library;
use crate::sequence::{self, SequenceError};

/// Upper bound of frames handed to the encoder
pub const DEFAULT_MAX_FRAMES: usize = 100;

/// Seconds each sampled frame stays on screen
pub const FRAME_DURATION: f64 = 0.04;

/// Preview width in pixels (height follows aspect)
pub const PREVIEW_WIDTH: u32 = 256;

/// Thumbnail errors
#[derive(Debug)]
pub enum ThumbError {
    /// Sampler got no frames at all
    EmptySequence,
    Sequence(SequenceError),
    EncoderFailed(String),
    Io(String),
}

impl std::fmt::Display for ThumbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbError::EmptySequence => write!(f, "No frames to sample"),
            ThumbError::Sequence(e) => write!(f, "{}", e),
            ThumbError::EncoderFailed(msg) => write!(f, "Preview encoder failed: {}", msg),
            ThumbError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ThumbError {}

impl From<SequenceError> for ThumbError {
    fn from(e: SequenceError) -> Self {
        ThumbError::Sequence(e)
    }
}

/// Pick at most `max` frames spread evenly over `frames`, keeping their order
///
/// The timeline is cut into `max` buckets; frame `i` falls into bucket
/// `i * max / total` and only the first frame of each bucket is kept.
pub fn sample_frames<T: Clone>(frames: &[T], max: usize) -> Result<Vec<T>, ThumbError> {
    let total = frames.len();
    if total == 0 {
        return Err(ThumbError::EmptySequence);
    }
    if total <= max {
        return Ok(frames.to_vec());
    }

    let mut claimed = vec![false; max];
    let mut picked = Vec::with_capacity(max);
    for (i, frame) in frames.iter().enumerate() {
        let bucket = i * max / total;
        if let Some(slot) = claimed.get_mut(bucket) {
            if !*slot {
                *slot = true;
                picked.push(frame.clone());
            }
        }
    }
    Ok(picked)
}

/// External preview renderer
pub trait PreviewEncoder {
    /// Render `frames` (already sampled, in order) into `output`
    fn encode(&self, frames: &[PathBuf], output: &Path) -> Result<(), ThumbError>;
}

/// Preview encoder shelling out to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    pub executable: PathBuf,
    pub framerate: u32,
}

impl FfmpegEncoder {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self { executable: executable.into(), framerate: 24 }
    }

    /// ffmpeg concat demuxer script for `frames`
    pub fn concat_list(frames: &[PathBuf]) -> String {
        let mut list = String::new();
        for frame in frames {
            list.push_str(&format!("file '{}'\n", frame.display()));
            list.push_str(&format!("duration {}\n", FRAME_DURATION));
        }
        list
    }

    fn run(&self, list_path: &Path, output: &Path) -> Result<(), ThumbError> {
        let result = Command::new(&self.executable)
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_path)
            .args(["-vf", &format!("scale={}:-1", PREVIEW_WIDTH)])
            .args(["-framerate", &self.framerate.to_string()])
            .arg("-y")
            .arg(output)
            .output()
            .map_err(|e| ThumbError::EncoderFailed(format!("{}: {}", self.executable.display(), e)))?;

        debug!("ffmpeg stdout: {}", String::from_utf8_lossy(&result.stdout));
        if !result.status.success() {
            return Err(ThumbError::EncoderFailed(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl PreviewEncoder for FfmpegEncoder {
    fn encode(&self, frames: &[PathBuf], output: &Path) -> Result<(), ThumbError> {
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("preview");
        let list_path = output.with_file_name(format!("{}_frame_list.txt", stem));

        fs::write(&list_path, Self::concat_list(frames))
            .map_err(|e| ThumbError::Io(format!("{}: {}", list_path.display(), e)))?;

        info!("Encoding preview {} from {} frames", output.display(), frames.len());
        let result = self.run(&list_path, output);

        if let Err(e) = fs::remove_file(&list_path) {
            warn!("Could not remove {}: {}", list_path.display(), e);
        }
        result
    }
}

/// Result of one preview request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Written(PathBuf),
    /// Preview already existed, encoder not invoked
    Skipped(PathBuf),
}

/// Sampled, frame-ordered paths of the authoritative sequence in `element_dir`
pub fn preview_frames(element_dir: &Path, max: usize) -> Result<Vec<PathBuf>, ThumbError> {
    let names = sequence::list_dir(element_dir)?;
    let desc = sequence::longest(&names)?;
    let frames: Vec<PathBuf> = desc
        .member_frames(&names)
        .into_iter()
        .map(|(_, name)| element_dir.join(name))
        .collect();
    sample_frames(&frames, max)
}

/// Render the preview of one element unless it already exists
pub fn render_preview(
    element_dir: &Path,
    output: &Path,
    encoder: &dyn PreviewEncoder,
    max: usize,
) -> Result<PreviewOutcome, ThumbError> {
    if output.exists() {
        debug!("{} exists, skipping", output.display());
        return Ok(PreviewOutcome::Skipped(output.to_path_buf()));
    }

    let frames = preview_frames(element_dir, max)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| ThumbError::Io(format!("{}: {}", parent.display(), e)))?;
    }
    encoder.encode(&frames, output)?;
    Ok(PreviewOutcome::Written(output.to_path_buf()))
}

/// Render previews for `names` in one category of a library
///
/// Failures stay per element; the rest of the batch still runs.
pub fn generate_previews(
    root: &Path,
    category: &str,
    names: &[String],
    encoder: &dyn PreviewEncoder,
) -> Vec<(String, Result<PreviewOutcome, ThumbError>)> {
    names
        .iter()
        .map(|name| {
            let element_dir = library::element_dir(root, category, name);
            let output = library::preview_path(root, category, name);
            let result = render_preview(&element_dir, &output, encoder, DEFAULT_MAX_FRAMES);
            if let Err(e) = &result {
                warn!("Preview for {}/{} failed: {}", category, name, e);
            }
            (name.clone(), result)
        })
        .collect()
}
