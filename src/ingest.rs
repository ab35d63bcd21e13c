//! Element ingestion: requests in, load plans out
//!
//! **Why**: Loading an element is more than pointing a reader at a folder. The
//! element may have to be copied into the show first, the right library copy
//! has to be picked, the sequence inferred, and optional centering and time
//! offset steps added. All of that is decided here and returned as a [`LoadPlan`].
//!
//! **Used by**: Host panel "Load" action, `load` CLI command
//!
//! # Per element
//!
//! 1. Copy-on-load: materialize a show copy if there is none (failure → global)
//! 2. Pick the source library (show first unless the request prefers global;
//!    a copy-on-load request always reads its show copy)
//! 3. Detect the authoritative sequence (failure → element skipped)
//! 4. Read step, laid out left to right, carrying the sidecar summary and curve
//! 5. Centered modes: centering transform from the sidecar curve
//! 6. Time shift when the element does not start on the requested frame
//!
//! Elements fail one by one; a missing library root fails the whole batch.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::LibraryConfig;
use crate::copy::CopyEngine;
use crate::library::{self, LibraryKind};
use crate::plan::{
    Aggregation, AggregationKind, Fallback, LoadPlan, NodeTag, Operation, OperationChain, Position,
    ThumbnailRender, THUMB_BOX, THUMB_FRAMES,
};
use crate::sequence::{self, SequenceDescriptor};
use crate::sidecar::{self, CurveSource, ElementSidecar, SidecarStore};

/// How loaded elements are wired up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    #[default]
    Standard,
    Switch,
    Centered,
    CenteredSwitch,
    ThumbnailSetup,
}

impl LoadMode {
    pub fn centered(&self) -> bool {
        matches!(self, LoadMode::Centered | LoadMode::CenteredSwitch)
    }

    pub fn switch(&self) -> bool {
        matches!(self, LoadMode::Switch | LoadMode::CenteredSwitch)
    }

    pub fn thumbnail(&self) -> bool {
        matches!(self, LoadMode::ThumbnailSetup)
    }

    pub fn all() -> &'static [LoadMode] {
        &[
            LoadMode::Standard,
            LoadMode::Switch,
            LoadMode::Centered,
            LoadMode::CenteredSwitch,
            LoadMode::ThumbnailSetup,
        ]
    }

    fn key(&self) -> &'static str {
        match self {
            LoadMode::Standard => "standard",
            LoadMode::Switch => "switch",
            LoadMode::Centered => "centered",
            LoadMode::CenteredSwitch => "centered-switch",
            LoadMode::ThumbnailSetup => "thumb-setup",
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        LoadMode::all()
            .iter()
            .copied()
            .find(|m| m.key() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = LoadMode::all().iter().map(|m| m.key()).collect();
                format!("unknown load mode '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Batch-level ingestion errors
#[derive(Debug)]
pub enum IngestError {
    InvalidRequest(String),
    /// Requested library root is missing, nothing to iterate over
    LibraryMissing(PathBuf),
    /// Single element could not be resolved
    ElementUnresolvable { element: String, reason: SkipReason },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::InvalidRequest(msg) => write!(f, "Invalid ingestion request: {}", msg),
            IngestError::LibraryMissing(root) => write!(f, "Library root does not exist: {}", root.display()),
            IngestError::ElementUnresolvable { element, reason } => write!(f, "{}: {}", element, reason),
        }
    }
}

impl std::error::Error for IngestError {}

/// Validated ingestion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    elements: Vec<String>,
    category: String,
    prefer: LibraryKind,
    start_frame: i64,
    mode: LoadMode,
    copy_on_load: bool,
}

fn check_name(kind: &str, name: &str) -> Result<(), IngestError> {
    if name.trim().is_empty() {
        return Err(IngestError::InvalidRequest(format!("empty {} name", kind)));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(IngestError::InvalidRequest(format!("{} name '{}' is not a plain folder name", kind, name)));
    }
    Ok(())
}

impl IngestRequest {
    /// Standard-mode request preferring the show library, no copy
    pub fn new<S: Into<String>>(
        category: impl Into<String>,
        elements: impl IntoIterator<Item = S>,
        start_frame: i64,
    ) -> Result<Self, IngestError> {
        let category = category.into();
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();

        check_name("category", &category)?;
        if elements.is_empty() {
            return Err(IngestError::InvalidRequest("no elements requested".into()));
        }
        for element in &elements {
            check_name("element", element)?;
        }

        Ok(Self {
            elements,
            category,
            prefer: LibraryKind::Show,
            start_frame,
            mode: LoadMode::Standard,
            copy_on_load: false,
        })
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_copy_on_load(mut self, copy: bool) -> Self {
        self.copy_on_load = copy;
        self
    }

    pub fn prefer(mut self, library: LibraryKind) -> Self {
        self.prefer = library;
        self
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn preferred_library(&self) -> LibraryKind {
        self.prefer
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn copy_on_load(&self) -> bool {
        self.copy_on_load
    }
}

/// Why an element was left out of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Element folder exists in none of the searched libraries
    NotFound { searched: Vec<PathBuf> },
    /// Folder exists but holds no usable image sequence
    NoSequence { dir: PathBuf, detail: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotFound { searched } => {
                let dirs: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
                write!(f, "not found (searched {})", dirs.join(", "))
            }
            SkipReason::NoSequence { dir, detail } => {
                write!(f, "no image sequence in {} ({})", dir.display(), detail)
            }
        }
    }
}

/// Element that did not make it into the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedElement {
    pub element: String,
    pub reason: SkipReason,
    pub fallback: Option<Fallback>,
}

impl std::fmt::Display for SkippedElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.element, self.reason)?;
        if let Some(fallback) = &self.fallback {
            write!(f, "; {}", fallback)?;
        }
        Ok(())
    }
}

/// Plan plus the per-element diagnostics of one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub plan: LoadPlan,
    pub skipped: Vec<SkippedElement>,
}

impl IngestOutcome {
    /// Chains that read from a fallback source
    pub fn fallbacks(&self) -> impl Iterator<Item = (&str, &Fallback)> {
        self.plan
            .chains
            .iter()
            .filter_map(|c| c.fallback.as_ref().map(|f| (c.element.as_str(), f)))
    }
}

/// Element whose source library and sequence are known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    pub name: String,
    pub category: String,
    pub library: LibraryKind,
    pub dir: PathBuf,
    pub sequence: SequenceDescriptor,
    pub fallback: Option<Fallback>,
}

impl ResolvedElement {
    /// Full read pattern, e.g. `/show/fx/wisp/wisp.%04d.exr`
    pub fn read_pattern(&self) -> PathBuf {
        self.sequence.pattern_path(&self.dir)
    }
}

/// Turns ingestion requests into load plans
pub struct Ingestor {
    config: LibraryConfig,
    copier: CopyEngine,
}

impl Ingestor {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config, copier: CopyEngine::new() }
    }

    /// Use a preconfigured copy engine (cancel flag, progress channel)
    pub fn with_copy_engine(mut self, copier: CopyEngine) -> Self {
        self.copier = copier;
        self
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    fn check_roots(&self, req: &IngestRequest) -> Result<(), IngestError> {
        let preferred = self.config.root(req.prefer);
        if preferred.is_dir() {
            return Ok(());
        }
        // A missing show library is fine when this request is about to create it
        if req.prefer == LibraryKind::Show && req.copy_on_load && self.config.global_root.is_dir() {
            return Ok(());
        }
        Err(IngestError::LibraryMissing(preferred.to_path_buf()))
    }

    /// Build the load plan for `req`
    pub fn ingest(&self, req: &IngestRequest) -> Result<IngestOutcome, IngestError> {
        self.check_roots(req)?;
        info!(
            "Ingesting {} element(s) from {} ({}, start {})",
            req.elements.len(),
            req.category,
            req.mode,
            req.start_frame
        );

        let mut outcome = IngestOutcome::default();
        let mut last_source: Option<Position> = None;

        for name in &req.elements {
            let element = match self.resolve(req, name) {
                Ok(element) => element,
                Err(skipped) => {
                    warn!("Skipping {}", skipped);
                    outcome.skipped.push(skipped);
                    continue;
                }
            };

            let source_pos = match last_source {
                None => Position::from(self.config.layout.origin),
                Some(prev) => prev.offset(self.config.layout.column_spacing, 0),
            };
            last_source = Some(source_pos);

            let chain = self.build_chain(req, element, source_pos);
            outcome.plan.chains.push(chain);
        }

        if req.mode.switch() {
            if let Some(center) = Position::mean(&outcome.plan.anchors()) {
                outcome.plan.aggregation = Some(Aggregation {
                    kind: AggregationKind::Switch,
                    position: center.offset(0, self.config.layout.switch_drop),
                    inputs: outcome.plan.chains.iter().map(|c| c.element.clone()).collect(),
                });
            }
        }

        info!(
            "Plan ready: {} chain(s), {} skipped",
            outcome.plan.chains.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Copy (if asked), pick the library, detect the sequence
    fn resolve(&self, req: &IngestRequest, name: &str) -> Result<ResolvedElement, SkippedElement> {
        let category = req.category.as_str();
        let show_dir = library::element_dir(&self.config.show_root, category, name);

        let mut fallback = None;
        if req.copy_on_load && !show_dir.exists() {
            match self.copier.copy_element(&self.config.global_root, category, name, &self.config.show_root) {
                Ok(report) => info!("Copied {} to {} ({} files)", name, report.destination.display(), report.copied.len()),
                Err(e) => {
                    warn!("Copy of {} to show failed, using global source: {}", name, e);
                    fallback = Some(Fallback::CopyFailed { reason: e.to_string() });
                }
            }
        }

        // A show copy asked for (and made) by this request always wins over the preference
        let order: &[LibraryKind] = if fallback.is_some() {
            &[LibraryKind::Global]
        } else if req.copy_on_load {
            &[LibraryKind::Show, LibraryKind::Global]
        } else {
            match req.prefer {
                LibraryKind::Show => &[LibraryKind::Show, LibraryKind::Global],
                LibraryKind::Global => &[LibraryKind::Global, LibraryKind::Show],
            }
        };

        let candidates: Vec<(LibraryKind, PathBuf)> = order
            .iter()
            .map(|kind| (*kind, library::element_dir(self.config.root(*kind), category, name)))
            .collect();

        let Some((kind, dir)) = candidates.iter().find(|(_, dir)| dir.is_dir()).cloned() else {
            return Err(SkippedElement {
                element: name.to_string(),
                reason: SkipReason::NotFound { searched: candidates.into_iter().map(|(_, d)| d).collect() },
                fallback,
            });
        };

        let sequence = sequence::detect_in_dir(&dir).map_err(|e| SkippedElement {
            element: name.to_string(),
            reason: SkipReason::NoSequence { dir: dir.clone(), detail: e.to_string() },
            fallback: fallback.clone(),
        })?;

        debug!("{} resolved to {} ({})", name, dir.display(), kind.label());
        Ok(ResolvedElement {
            name: name.to_string(),
            category: category.to_string(),
            library: kind,
            dir,
            sequence,
            fallback,
        })
    }

    fn build_chain(&self, req: &IngestRequest, element: ResolvedElement, source_pos: Position) -> OperationChain {
        let layout = self.config.layout;
        let pattern = element.read_pattern();
        let ResolvedElement { name, category, library, dir, sequence, fallback } = element;

        let (info, source) = element_info(&dir, &name, &sequence);
        let mut chain = OperationChain::new(&name, &category, library, dir, sequence);
        chain.fallback = fallback;

        chain.push(
            source_pos,
            Operation::ReadSequence {
                pattern,
                first: chain.sequence.start,
                last: chain.sequence.end,
                tag: NodeTag::for_element(&name, library),
                info: info.clone(),
            },
        );

        if req.mode.centered() {
            let frame_center = info.center();
            chain.push(
                source_pos.offset(0, layout.center_drop),
                Operation::CenterTransform {
                    label: name.clone(),
                    animated: info.source_point.is_animated(),
                    keys: info.source_point.centering_keys(frame_center),
                    source,
                },
            );
        }

        let native_start = chain.sequence.start;
        if !req.mode.thumbnail() && chain.sequence.is_numbered() && native_start != req.start_frame {
            match req.start_frame.checked_sub(native_start) {
                Some(offset) => {
                    let pos = chain.anchor.offset(0, layout.step_drop);
                    chain.push(pos, Operation::TimeShift { offset });
                }
                None => warn!(
                    "Can not shift {} from frame {} to {}, left unshifted",
                    name, native_start, req.start_frame
                ),
            }
        }

        if req.mode.thumbnail() {
            let root = self.config.root(library);
            let preview = library::preview_path(root, &category, &name);
            let disabled = preview.exists();
            if disabled {
                debug!("{} exists, thumbnail write disabled", preview.display());
            }
            let pos = chain.anchor.offset(0, layout.step_drop);
            chain.push(
                pos,
                Operation::ThumbnailRender(ThumbnailRender {
                    first: THUMB_FRAMES.0,
                    last: THUMB_FRAMES.1,
                    box_width: THUMB_BOX.0,
                    box_height: THUMB_BOX.1,
                    output: library::preview_movie_path(root, &category, &name),
                    preview,
                    disabled,
                }),
            );
        }

        chain
    }

    /// Resolve one element without building a chain
    pub fn resolve_element(&self, req: &IngestRequest, name: &str) -> Result<ResolvedElement, IngestError> {
        self.resolve(req, name).map_err(|s| IngestError::ElementUnresolvable { element: s.element, reason: s.reason })
    }

    /// Move an element into the show library and return its show-local source
    ///
    /// Elements already in the show are not copied again.
    pub fn relocate_to_show(&self, category: &str, name: &str) -> Result<ResolvedElement, IngestError> {
        let req = IngestRequest::new(category, [name], 0)?
            .prefer(LibraryKind::Show)
            .with_copy_on_load(true);

        if !self.config.global_root.is_dir() && !self.config.show_root.is_dir() {
            return Err(IngestError::LibraryMissing(self.config.global_root.clone()));
        }

        let element = self.resolve_element(&req, name)?;
        if element.library == LibraryKind::Show {
            info!("{} now reads from {}", name, element.read_pattern().display());
        }
        Ok(element)
    }
}

/// Summary and centering curve attached to an element's read step
///
/// Image size comes from the frame header first, then the stored sidecar.
fn element_info(dir: &Path, name: &str, seq: &SequenceDescriptor) -> (ElementSidecar, CurveSource) {
    let size = match seq.resolution(dir) {
        Ok(size) => size,
        Err(e) => match SidecarStore::read(dir, name) {
            Ok(stored) => (stored.width, stored.height),
            Err(_) => {
                warn!("Unknown resolution for {}, assuming 0x0: {}", name, e);
                (0, 0)
            }
        },
    };
    let (curve, source) = SidecarStore::resolve_curve(dir, name, sidecar::image_center(size.0, size.1));
    (ElementSidecar::from_descriptor(dir, name, seq, size, Some(curve)), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::CenterCurve;
    use std::fs;
    use tempfile::TempDir;

    struct Libs {
        _tmp: TempDir,
        config: LibraryConfig,
    }

    fn libs() -> Libs {
        let tmp = tempfile::tempdir().unwrap();
        let global = tmp.path().join("global");
        let show = tmp.path().join("show");
        fs::create_dir_all(&global).unwrap();
        fs::create_dir_all(&show).unwrap();
        Libs { config: LibraryConfig::new(global, show), _tmp: tmp }
    }

    fn add_element(root: &Path, category: &str, name: &str, frames: std::ops::RangeInclusive<i64>) -> PathBuf {
        let dir = library::element_dir(root, category, name);
        fs::create_dir_all(&dir).unwrap();
        for i in frames {
            fs::write(dir.join(format!("{}.{:04}.exr", name, i)), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("centered-switch".parse::<LoadMode>().unwrap(), LoadMode::CenteredSwitch);
        assert_eq!("Centered Switch".parse::<LoadMode>().unwrap(), LoadMode::CenteredSwitch);
        assert_eq!("thumb_setup".parse::<LoadMode>().unwrap(), LoadMode::ThumbnailSetup);
        assert!("bogus".parse::<LoadMode>().is_err());
        for mode in LoadMode::all() {
            assert_eq!(mode.to_string().parse::<LoadMode>().unwrap(), *mode);
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(IngestRequest::new("fx", Vec::<String>::new(), 1).is_err());
        assert!(IngestRequest::new("", ["a"], 1).is_err());
        assert!(IngestRequest::new("fx", ["../etc"], 1).is_err());
        assert!(IngestRequest::new("fx", ["ok"], 1).is_ok());
    }

    #[test]
    fn test_standard_layout_and_time_shift() {
        let libs = libs();
        add_element(&libs.config.global_root, "smoke", "wisp", 1..=24);
        add_element(&libs.config.global_root, "smoke", "plume", 1001..=1010);

        let req = IngestRequest::new("smoke", ["wisp", "plume"], 1001).unwrap();
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();
        let chains = &outcome.plan.chains;

        assert_eq!(chains.len(), 2);
        assert!(outcome.skipped.is_empty());
        assert!(outcome.plan.aggregation.is_none());

        assert_eq!(chains[0].source_position(), Some(Position::new(0, 0)));
        assert_eq!(chains[1].source_position(), Some(Position::new(100, 0)));
        assert_eq!(chains[0].library, LibraryKind::Global);

        let wisp_ops: Vec<&Operation> = chains[0].ops().collect();
        assert_eq!(wisp_ops.len(), 2);
        match wisp_ops[0] {
            Operation::ReadSequence { pattern, first, last, tag, .. } => {
                assert!(pattern.ends_with("wisp/wisp.%04d.exr"));
                assert_eq!((*first, *last), (1, 24));
                assert_eq!(tag.label, "wisp\nglobal lib");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(wisp_ops[1], &Operation::TimeShift { offset: 1000 });
        assert_eq!(chains[0].anchor, Position::new(0, 35));

        // already starts on the requested frame
        assert_eq!(chains[1].steps.len(), 1);
        assert_eq!(chains[1].anchor, Position::new(100, 0));
    }

    #[test]
    fn test_show_copy_preferred() {
        let libs = libs();
        add_element(&libs.config.global_root, "fire", "torch", 1..=5);
        add_element(&libs.config.show_root, "fire", "torch", 1..=5);

        let ingestor = Ingestor::new(libs.config.clone());
        let req = IngestRequest::new("fire", ["torch"], 1).unwrap();
        assert_eq!(ingestor.ingest(&req).unwrap().plan.chains[0].library, LibraryKind::Show);

        let req = req.prefer(LibraryKind::Global);
        assert_eq!(ingestor.ingest(&req).unwrap().plan.chains[0].library, LibraryKind::Global);
    }

    #[test]
    fn test_centered_switch_with_missing_element() {
        let libs = libs();
        let dir = add_element(&libs.config.global_root, "sparks", "burst", 1..=10);
        let curve = CenterCurve::from_keys([(1, [10.0, 20.0]), (10, [30.0, 40.0])]);
        SidecarStore::write(&ElementSidecar {
            element_name: "burst".into(),
            element_dir: dir.clone(),
            start: 1,
            end: 10,
            duration: 9,
            width: 200,
            height: 100,
            source_point: curve,
        })
        .unwrap();

        let req = IngestRequest::new("sparks", ["ghost", "burst"], 1)
            .unwrap()
            .with_mode(LoadMode::CenteredSwitch);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        assert_eq!(outcome.plan.chains.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].element, "ghost");
        assert!(matches!(outcome.skipped[0].reason, SkipReason::NotFound { .. }));
        assert!(outcome.skipped[0].to_string().contains("not found"));

        let chain = &outcome.plan.chains[0];
        assert_eq!(chain.source_position(), Some(Position::new(0, 0)));
        match &chain.steps[1].op {
            Operation::CenterTransform { animated, keys, source, .. } => {
                assert!(*animated);
                assert_eq!(*source, CurveSource::Sidecar);
                assert_eq!(keys.len(), 2);
                // frame headers are unreadable here, so the sidecar size (200x100) is used
                assert_eq!(keys[0].translate, [90.0, 30.0]);
                assert_eq!(keys[1].center, [30.0, 40.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.steps[1].position, Position::new(0, 100));

        let switch = outcome.plan.aggregation.as_ref().unwrap();
        assert_eq!(switch.kind, AggregationKind::Switch);
        assert_eq!(switch.position, Position::new(0, 300));
        assert_eq!(switch.inputs, vec!["burst"]);
    }

    #[test]
    fn test_centered_without_sidecar_uses_static_center() {
        let libs = libs();
        add_element(&libs.config.global_root, "dust", "motes", 1..=3);

        let req = IngestRequest::new("dust", ["motes"], 1).unwrap().with_mode(LoadMode::Centered);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        match &outcome.plan.chains[0].steps[1].op {
            Operation::CenterTransform { animated, keys, source, .. } => {
                assert!(!animated);
                assert_eq!(*source, CurveSource::ImageCenter);
                assert_eq!(keys.len(), 1);
                assert_eq!(keys[0].frame, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_copy_on_load_materializes_show_copy() {
        let libs = libs();
        add_element(&libs.config.global_root, "leaks", "flare", 1..=6);

        let req = IngestRequest::new("leaks", ["flare"], 1).unwrap().with_copy_on_load(true);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        let chain = &outcome.plan.chains[0];
        assert_eq!(chain.library, LibraryKind::Show);
        assert!(chain.fallback.is_none());
        assert!(library::element_dir(&libs.config.show_root, "leaks", "flare").join("flare.0006.exr").is_file());
    }

    #[test]
    fn test_failed_copy_falls_back_to_global() {
        let libs = libs();
        add_element(&libs.config.global_root, "leaks", "flare", 1..=6);
        // a plain file where the show category folder should go makes the copy fail
        fs::write(libs.config.show_root.join("leaks"), b"").unwrap();

        let req = IngestRequest::new("leaks", ["flare"], 1).unwrap().with_copy_on_load(true);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        let chain = &outcome.plan.chains[0];
        assert_eq!(chain.library, LibraryKind::Global);
        assert!(matches!(chain.fallback, Some(Fallback::CopyFailed { .. })));
        assert_eq!(outcome.fallbacks().count(), 1);
        assert!(outcome.fallbacks().next().unwrap().1.to_string().contains("used fallback source"));
    }

    #[test]
    fn test_no_sequence_is_skipped() {
        let libs = libs();
        let dir = library::element_dir(&libs.config.global_root, "fx", "empty");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();
        add_element(&libs.config.global_root, "fx", "good", 1..=2);

        let req = IngestRequest::new("fx", ["empty", "good"], 1).unwrap();
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        assert_eq!(outcome.plan.chains.len(), 1);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::NoSequence { .. }));
        assert!(outcome.skipped[0].to_string().contains("no image sequence"));
    }

    #[test]
    fn test_missing_library_root_fails_batch() {
        let libs = libs();
        let mut config = libs.config.clone();
        config.show_root = config.show_root.join("does_not_exist");

        let req = IngestRequest::new("fx", ["a"], 1).unwrap();
        let err = Ingestor::new(config.clone()).ingest(&req).unwrap_err();
        assert!(matches!(err, IngestError::LibraryMissing(_)));

        // copy-on-load creates the show library from the global one
        let req = req.with_copy_on_load(true);
        assert!(Ingestor::new(config).ingest(&req).is_ok());
    }

    #[test]
    fn test_thumbnail_setup() {
        let libs = libs();
        add_element(&libs.config.global_root, "fx", "old", 50..=90);
        add_element(&libs.config.global_root, "fx", "new", 1..=10);
        let thumbs = library::thumbnail_dir(&libs.config.global_root, "fx");
        fs::create_dir_all(&thumbs).unwrap();
        fs::write(thumbs.join("old.gif"), b"GIF89a").unwrap();

        let req = IngestRequest::new("fx", ["old", "new"], 1001)
            .unwrap()
            .with_mode(LoadMode::ThumbnailSetup);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        assert!(outcome.plan.aggregation.is_none());
        for chain in &outcome.plan.chains {
            assert!(!chain.ops().any(|op| matches!(op, Operation::TimeShift { .. })));
        }
        let renders: Vec<&ThumbnailRender> = outcome
            .plan
            .chains
            .iter()
            .filter_map(|c| match &c.steps.last().unwrap().op {
                Operation::ThumbnailRender(render) => Some(render),
                _ => None,
            })
            .collect();
        assert_eq!(renders.len(), 2);
        assert!(renders[0].disabled);
        assert!(!renders[1].disabled);
        assert_eq!((renders[1].first, renders[1].last), (1, 20));
        assert_eq!((renders[1].box_width, renders[1].box_height), (256, 256));
        assert!(renders[1].output.ends_with("fx/_thumbnails/mov/new.mov"));
    }

    #[test]
    fn test_copy_on_load_reads_show_copy_despite_global_preference() {
        let libs = libs();
        add_element(&libs.config.global_root, "fx", "wisp", 1..=4);

        let req = IngestRequest::new("fx", ["wisp"], 1)
            .unwrap()
            .prefer(LibraryKind::Global)
            .with_copy_on_load(true);
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        assert!(library::element_dir(&libs.config.show_root, "fx", "wisp").is_dir());
        let chain = &outcome.plan.chains[0];
        assert_eq!(chain.library, LibraryKind::Show);
        assert!(chain.fallback.is_none());
    }

    #[test]
    fn test_read_step_carries_sidecar_in_standard_mode() {
        let libs = libs();
        let dir = add_element(&libs.config.global_root, "fx", "wisp", 1..=5);
        SidecarStore::write(&ElementSidecar {
            element_name: "wisp".into(),
            element_dir: dir.clone(),
            start: 1,
            end: 5,
            duration: 4,
            width: 640,
            height: 480,
            source_point: CenterCurve::fixed([1.0, 2.0]),
        })
        .unwrap();
        add_element(&libs.config.global_root, "fx", "bare", 1..=2);

        let req = IngestRequest::new("fx", ["wisp", "bare"], 1).unwrap();
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        match &outcome.plan.chains[0].steps[0].op {
            Operation::ReadSequence { info, .. } => {
                assert_eq!(info.source_point, CenterCurve::fixed([1.0, 2.0]));
                assert_eq!((info.width, info.height), (640, 480));
                assert_eq!((info.start, info.end, info.duration), (1, 5, 4));
                assert_eq!(info.element_dir, dir);
            }
            other => panic!("unexpected {:?}", other),
        }
        // no sidecar: static point at the (unknown) image center
        match &outcome.plan.chains[1].steps[0].op {
            Operation::ReadSequence { info, .. } => {
                assert_eq!(info.source_point, CenterCurve::fixed([0.0, 0.0]));
                assert_eq!(info.element_name, "bare");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(outcome.plan.to_json().unwrap().contains("source_point"));
    }

    #[test]
    fn test_unrepresentable_time_shift_is_left_out() {
        let libs = libs();
        add_element(&libs.config.global_root, "fx", "wisp", 5..=6);

        let req = IngestRequest::new("fx", ["wisp"], i64::MIN).unwrap();
        let outcome = Ingestor::new(libs.config.clone()).ingest(&req).unwrap();

        let chain = &outcome.plan.chains[0];
        assert_eq!(chain.steps.len(), 1);
        assert!(!chain.ops().any(|op| matches!(op, Operation::TimeShift { .. })));
    }

    #[test]
    fn test_relocate_to_show() {
        let libs = libs();
        add_element(&libs.config.global_root, "smoke", "wisp", 1..=4);

        let ingestor = Ingestor::new(libs.config.clone());
        let element = ingestor.relocate_to_show("smoke", "wisp").unwrap();
        assert_eq!(element.library, LibraryKind::Show);
        assert_eq!(
            element.read_pattern(),
            library::element_dir(&libs.config.show_root, "smoke", "wisp").join("wisp.%04d.exr")
        );

        let again = ingestor.relocate_to_show("smoke", "wisp").unwrap();
        assert_eq!(again.library, LibraryKind::Show);
        assert!(matches!(ingestor.relocate_to_show("smoke", "nope"), Err(IngestError::ElementUnresolvable { .. })));
    }
}
