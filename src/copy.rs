//! Copy an element between library roots
//!
//! **Why**: Shows work on their own copy of an element so the shared library
//! stays untouched and the show can be archived on its own.
//!
//! **Used by**: Ingestor (copy-on-load, relocate to show), `copy` CLI command
//!
//! # Policy
//!
//! - Only the authoritative sequence is copied (files sharing its base name),
//!   so stray renders in a contaminated folder stay behind
//! - Destination folders are created group/world writable (mode 0777 with the
//!   process umask cleared for the duration of the call)
//! - A failing file does not stop the others: the caller gets
//!   [`CopyError::PartialFailure`] with everything that did land
//! - The cancel flag is checked between files; a cancelled copy leaves a partial
//!   destination that a later copy simply completes
//! - The preview GIF is copied best-effort, its failure is only logged

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::library;
use crate::sequence::{self, SequenceDescriptor, SequenceError};
use crate::sidecar::SidecarStore;

/// Per-file copy failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// What a copy did
#[derive(Debug, Clone)]
pub struct CopyReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub sequence: SequenceDescriptor,
    pub copied: Vec<String>,
    pub failed: Vec<FileFailure>,
    pub thumbnail_copied: bool,
    pub cancelled: bool,
}

/// Progress updates while copying
#[derive(Clone, Debug)]
pub struct CopyProgress {
    pub current_file: usize,
    pub total_files: usize,
    pub file: String,
}

/// Copy errors
#[derive(Debug)]
pub enum CopyError {
    SourceMissing(PathBuf),
    Sequence(SequenceError),
    CreateDir { path: PathBuf, error: String },
    /// Some files failed, the rest were copied
    PartialFailure(CopyReport),
    Cancelled(CopyReport),
}

impl std::fmt::Display for CopyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyError::SourceMissing(path) => write!(f, "Source element not found: {}", path.display()),
            CopyError::Sequence(e) => write!(f, "{}", e),
            CopyError::CreateDir { path, error } => {
                write!(f, "Failed to create directory {}: {}", path.display(), error)
            }
            CopyError::PartialFailure(report) => {
                write!(f, "{} of {} files failed to copy to {}",
                    report.failed.len(),
                    report.failed.len() + report.copied.len(),
                    report.destination.display())
            }
            CopyError::Cancelled(report) => {
                write!(f, "Copy to {} cancelled after {} files", report.destination.display(), report.copied.len())
            }
        }
    }
}

impl std::error::Error for CopyError {}

impl From<SequenceError> for CopyError {
    fn from(e: SequenceError) -> Self {
        CopyError::Sequence(e)
    }
}

#[cfg(unix)]
mod umask {
    use std::sync::{Mutex, MutexGuard};

    // umask is process wide; serialize every override
    static UMASK_LOCK: Mutex<()> = Mutex::new(());

    /// Clears the process umask until dropped
    pub struct ClearedUmask {
        previous: libc::mode_t,
        _lock: MutexGuard<'static, ()>,
    }

    /// Current process umask, read under the override lock
    #[cfg(test)]
    pub fn current() -> libc::mode_t {
        let _lock = UMASK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // SAFETY: the mask is put back before the lock is released
        unsafe {
            let mask = libc::umask(0);
            libc::umask(mask);
            mask
        }
    }

    impl ClearedUmask {
        pub fn new() -> Self {
            let lock = UMASK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // SAFETY: umask only swaps the process file mode mask
            let previous = unsafe { libc::umask(0) };
            Self { previous, _lock: lock }
        }
    }

    impl Drop for ClearedUmask {
        fn drop(&mut self) {
            // SAFETY: see ClearedUmask::new
            unsafe {
                libc::umask(self.previous);
            }
        }
    }
}

/// Create `path` (and parents) writable for everyone; existing dirs are fine
pub fn create_shared_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        let _mask = umask::ClearedUmask::new();
        fs::DirBuilder::new().recursive(true).mode(0o777).create(path)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)
    }
}

/// Copies element sequences from one library root to another
#[derive(Debug, Clone, Default)]
pub struct CopyEngine {
    cancel: Arc<AtomicBool>,
    progress: Option<Sender<CopyProgress>>,
}

impl CopyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an external cancel flag (set it to `true` to stop between files)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, tx: Sender<CopyProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Files of `desc` (plus the element sidecar) found in a listing
    fn files_to_copy(source: &Path, name: &str, desc: &SequenceDescriptor, listing: &[String]) -> Vec<String> {
        // An empty base (digit-only names) would prefix-match everything
        let belongs = |f: &str| {
            if desc.base.is_empty() { desc.frame_of(f).is_some() } else { f.starts_with(desc.base.as_str()) }
        };
        let mut files: Vec<String> = listing
            .iter()
            .filter(|f| belongs(f.as_str()))
            .filter(|f| !source.join(f.as_str()).is_dir())
            .cloned()
            .collect();

        let sidecar = SidecarStore::file_name(name);
        if listing.contains(&sidecar) && !files.contains(&sidecar) {
            files.push(sidecar);
        }
        files.sort();
        files
    }

    /// Copy `<source_root>/<category>/<name>` into `<dest_root>/<category>/<name>`
    ///
    /// Safe to call when the destination already holds the element: files are
    /// overwritten with the source copies.
    pub fn copy_element(
        &self,
        source_root: &Path,
        category: &str,
        name: &str,
        dest_root: &Path,
    ) -> Result<CopyReport, CopyError> {
        let source = library::element_dir(source_root, category, name);
        let destination = library::element_dir(dest_root, category, name);

        if !source.is_dir() {
            return Err(CopyError::SourceMissing(source));
        }

        let listing = sequence::list_dir(&source)?;
        let desc = sequence::longest(&listing).map_err(|e| match e {
            SequenceError::NoSequenceFound(_) => SequenceError::NoSequenceFound(source.display().to_string()),
            other => other,
        })?;
        let files = Self::files_to_copy(&source, name, &desc, &listing);

        info!("Copying {} files of {} to {}", files.len(), desc.pattern, destination.display());

        create_shared_dir(&destination).map_err(|e| CopyError::CreateDir {
            path: destination.clone(),
            error: e.to_string(),
        })?;

        let mut report = CopyReport {
            source: source.clone(),
            destination: destination.clone(),
            sequence: desc,
            copied: Vec::with_capacity(files.len()),
            failed: Vec::new(),
            thumbnail_copied: false,
            cancelled: false,
        };

        let total = files.len();
        for (i, file) in files.into_iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Copy of {} cancelled at file {} of {}", name, i + 1, total);
                report.cancelled = true;
                return Err(CopyError::Cancelled(report));
            }

            if let Some(tx) = &self.progress {
                let _ = tx.send(CopyProgress { current_file: i + 1, total_files: total, file: file.clone() });
            }

            match fs::copy(source.join(&file), destination.join(&file)) {
                Ok(_) => {
                    debug!("Copied {}", file);
                    report.copied.push(file);
                }
                Err(e) => {
                    warn!("Failed copying {}: {}", file, e);
                    report.failed.push(FileFailure { file, error: e.to_string() });
                }
            }
        }

        report.thumbnail_copied = Self::copy_thumbnail(source_root, category, name, dest_root);

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(CopyError::PartialFailure(report))
        }
    }

    /// Best-effort preview copy, returns whether it landed
    fn copy_thumbnail(source_root: &Path, category: &str, name: &str, dest_root: &Path) -> bool {
        let Some(source) = library::existing_preview(source_root, category, name) else {
            debug!("No preview for {}/{} in {}", category, name, source_root.display());
            return false;
        };
        let dest_dir = library::thumbnail_dir(dest_root, category);
        let result = create_shared_dir(&dest_dir)
            .and_then(|_| fs::copy(&source, library::preview_path(dest_root, category, name)));
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("Had trouble with the preview of {}: {}", name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn make_element(root: &Path, category: &str, name: &str, frames: usize) -> PathBuf {
        let dir = library::element_dir(root, category, name);
        fs::create_dir_all(&dir).unwrap();
        for i in 1..=frames {
            fs::write(dir.join(format!("{}.{:04}.exr", name, i)), format!("frame {}", i)).unwrap();
        }
        dir
    }

    #[test]
    fn test_copies_only_authoritative_sequence() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        let src = make_element(global.path(), "smoke", "wisp", 8);
        fs::write(src.join("wisp.json"), "{}").unwrap();
        fs::write(src.join("contact_sheet.jpg"), b"").unwrap();
        fs::write(src.join("old_render_0001.png"), b"").unwrap();

        let report = CopyEngine::new().copy_element(global.path(), "smoke", "wisp", show.path()).unwrap();

        let dest = library::element_dir(show.path(), "smoke", "wisp");
        assert_eq!(report.copied.len(), 9);
        assert!(dest.join("wisp.0008.exr").is_file());
        assert!(dest.join("wisp.json").is_file());
        assert!(!dest.join("contact_sheet.jpg").exists());
        assert!(!dest.join("old_render_0001.png").exists());
        assert!(!report.thumbnail_copied);
    }

    #[test]
    fn test_copy_into_existing_destination() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "fire", "torch", 3);
        make_element(show.path(), "fire", "torch", 1);

        let engine = CopyEngine::new();
        engine.copy_element(global.path(), "fire", "torch", show.path()).unwrap();
        let again = engine.copy_element(global.path(), "fire", "torch", show.path()).unwrap();
        assert_eq!(again.copied.len(), 3);
    }

    #[test]
    fn test_copies_preview() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "fire", "torch", 2);
        let thumbs = library::thumbnail_dir(global.path(), "fire");
        fs::create_dir_all(&thumbs).unwrap();
        fs::write(thumbs.join("torch.gif"), b"GIF89a").unwrap();

        let report = CopyEngine::new().copy_element(global.path(), "fire", "torch", show.path()).unwrap();
        assert!(report.thumbnail_copied);
        assert!(library::preview_path(show.path(), "fire", "torch").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_file_is_partial_failure() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        let src = make_element(global.path(), "sparks", "burst", 10);
        fs::remove_file(src.join("burst.0005.exr")).unwrap();
        std::os::unix::fs::symlink(src.join("gone.exr"), src.join("burst.0005.exr")).unwrap();

        let report = match CopyEngine::new().copy_element(global.path(), "sparks", "burst", show.path()) {
            Err(CopyError::PartialFailure(report)) => report,
            other => panic!("expected partial failure, got {:?}", other.map(|r| r.copied)),
        };
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, "burst.0005.exr");
        assert_eq!(report.copied.len(), 9);

        let dest = library::element_dir(show.path(), "sparks", "burst");
        assert!(dest.join("burst.0004.exr").is_file());
        assert!(dest.join("burst.0010.exr").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_destination_is_world_writable() {
        use std::os::unix::fs::PermissionsExt;

        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "dust", "motes", 1);
        CopyEngine::new().copy_element(global.path(), "dust", "motes", show.path()).unwrap();

        let mode = fs::metadata(library::element_dir(show.path(), "dust", "motes")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn test_failed_preview_copy_is_not_an_error() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "fire", "torch", 2);
        let thumbs = library::thumbnail_dir(global.path(), "fire");
        fs::create_dir_all(&thumbs).unwrap();
        fs::write(thumbs.join("torch.gif"), b"GIF89a").unwrap();
        // a plain file where the show preview folder should go
        fs::create_dir_all(library::category_dir(show.path(), "fire")).unwrap();
        fs::write(library::thumbnail_dir(show.path(), "fire"), b"").unwrap();

        let report = CopyEngine::new().copy_element(global.path(), "fire", "torch", show.path()).unwrap();
        assert!(!report.thumbnail_copied);
        assert_eq!(report.copied.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_destination_dir_failure() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "fire", "torch", 2);
        fs::write(library::category_dir(show.path(), "fire"), b"").unwrap();

        #[cfg(unix)]
        let before = umask::current();

        let err = CopyEngine::new().copy_element(global.path(), "fire", "torch", show.path()).unwrap_err();
        match err {
            CopyError::CreateDir { path, .. } => {
                assert_eq!(path, library::element_dir(show.path(), "fire", "torch"));
            }
            other => panic!("expected create dir failure, got {}", other),
        }

        #[cfg(unix)]
        assert_eq!(umask::current(), before);
    }

    #[test]
    fn test_digit_only_names_copy_only_frames() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        let src = library::element_dir(global.path(), "misc", "plate");
        fs::create_dir_all(&src).unwrap();
        for i in 1..=3 {
            fs::write(src.join(format!("{:04}.exr", i)), b"").unwrap();
        }
        fs::write(src.join("notes.txt"), b"").unwrap();
        fs::write(src.join("other.png"), b"").unwrap();

        let report = CopyEngine::new().copy_element(global.path(), "misc", "plate", show.path()).unwrap();
        assert_eq!(report.copied, vec!["0001.exr", "0002.exr", "0003.exr"]);

        let dest = library::element_dir(show.path(), "misc", "plate");
        assert!(!dest.join("notes.txt").exists());
        assert!(!dest.join("other.png").exists());
    }

    #[test]
    fn test_cancel_stops_before_copying() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "dust", "motes", 4);

        let engine = CopyEngine::new();
        engine.cancel_flag().store(true, Ordering::Relaxed);
        let err = engine.copy_element(global.path(), "dust", "motes", show.path()).unwrap_err();

        match err {
            CopyError::Cancelled(report) => {
                assert!(report.cancelled);
                assert!(report.copied.is_empty());
            }
            other => panic!("expected cancel, got {}", other),
        }
    }

    #[test]
    fn test_progress_and_missing_source() {
        let global = tempfile::tempdir().unwrap();
        let show = tempfile::tempdir().unwrap();
        make_element(global.path(), "dust", "motes", 3);

        let (tx, rx) = mpsc::channel();
        let engine = CopyEngine::new().with_progress(tx);
        engine.copy_element(global.path(), "dust", "motes", show.path()).unwrap();
        let updates: Vec<CopyProgress> = rx.try_iter().collect();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2].current_file, 3);

        let err = engine.copy_element(global.path(), "dust", "nope", show.path()).unwrap_err();
        assert!(matches!(err, CopyError::SourceMissing(_)));
    }
}
