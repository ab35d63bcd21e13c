//! Load plans: the declarative result of ingestion
//!
//! **Why**: The host application owns the node graph. The core only describes
//! what to build (which reads, transforms and offsets, and where to put them),
//! so it can run and be tested without any host runtime.
//!
//! **Used by**: Ingestor (produces), host graph builders and the CLI (consume)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::library::LibraryKind;
use crate::sequence::SequenceDescriptor;
use crate::sidecar::{CenterKey, CurveSource, ElementSidecar};

/// Output frame range of a thumbnail render
pub const THUMB_FRAMES: (i64, i64) = (1, 20);

/// Box a thumbnail render is fitted into
pub const THUMB_BOX: (u32, u32) = (256, 256);

/// Node position in graph units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i64, dy: i64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    /// Component-wise mean, truncated toward zero
    pub fn mean(points: &[Position]) -> Option<Position> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        Some(Position::new((sx / n) as i64, (sy / n) as i64))
    }
}

impl From<(i64, i64)> for Position {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

/// Visual tag of a read step (label and tile colour)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTag {
    pub label: String,
    pub color: u32,
}

impl NodeTag {
    /// `"<element>\n<global lib|show lib>"`
    pub fn for_element(name: &str, library: LibraryKind) -> Self {
        Self { label: format!("{}\n{}", name, library.label()), color: library.tile_color() }
    }
}

/// Thumbnail render setup for one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRender {
    /// Retimed output range
    pub first: i64,
    pub last: i64,
    pub box_width: u32,
    pub box_height: u32,
    /// Movie the render writes
    pub output: PathBuf,
    /// Preview the movie is later turned into
    pub preview: PathBuf,
    /// Preview already exists, the write should stay disabled
    pub disabled: bool,
}

/// One abstract operation of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Image-source node reading `pattern` over `first..=last`
    ReadSequence {
        pattern: PathBuf,
        first: i64,
        last: i64,
        tag: NodeTag,
        /// Element summary and source point, from the sidecar when one exists
        info: ElementSidecar,
    },
    /// Transform that moves the element's source point to frame center
    CenterTransform {
        label: String,
        animated: bool,
        keys: Vec<CenterKey>,
        source: CurveSource,
    },
    /// Shift in time by `offset` frames
    TimeShift { offset: i64 },
    ThumbnailRender(ThumbnailRender),
}

/// Positioned operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub position: Position,
    pub op: Operation,
}

/// Why a chain reads from somewhere other than requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fallback {
    /// Copy to the show library failed; the global source was used
    CopyFailed { reason: String },
}

impl std::fmt::Display for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::CopyFailed { reason } => write!(f, "copy failed, used fallback source ({})", reason),
        }
    }
}

/// Operations for one element, in build order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationChain {
    pub element: String,
    pub category: String,
    pub library: LibraryKind,
    pub element_dir: PathBuf,
    pub sequence: SequenceDescriptor,
    pub steps: Vec<Step>,
    /// Position of the last step, where downstream nodes connect
    pub anchor: Position,
    pub fallback: Option<Fallback>,
}

impl OperationChain {
    pub fn new(
        element: &str,
        category: &str,
        library: LibraryKind,
        element_dir: PathBuf,
        sequence: SequenceDescriptor,
    ) -> Self {
        Self {
            element: element.to_string(),
            category: category.to_string(),
            library,
            element_dir,
            sequence,
            steps: Vec::new(),
            anchor: Position::default(),
            fallback: None,
        }
    }

    pub fn push(&mut self, position: Position, op: Operation) {
        self.anchor = position;
        self.steps.push(Step { position, op });
    }

    /// Position of the read step
    pub fn source_position(&self) -> Option<Position> {
        self.steps.first().map(|s| s.position)
    }

    pub fn ops(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter().map(|s| &s.op)
    }
}

/// Cross-chain step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Selector over all chain outputs
    Switch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub position: Position,
    /// Elements feeding the aggregation, in input order
    pub inputs: Vec<String>,
}

/// Ordered chains plus an optional aggregation step
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadPlan {
    pub chains: Vec<OperationChain>,
    pub aggregation: Option<Aggregation>,
}

impl LoadPlan {
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn anchors(&self) -> Vec<Position> {
        self.chains.iter().map(|c| c.anchor).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
