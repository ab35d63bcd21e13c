//! Library configuration and application paths
//!
//! **Why**: Library roots, the show and the ffmpeg location differ per site and
//! per show. They are gathered once at the edge (CLI, host plugin) into a
//! [`LibraryConfig`] value which is then handed to the core; nothing below reads
//! environment variables or globals.
//!
//! # Config file
//!
//! `elemental.json`, either passed explicitly or found in the config dir:
//!
//! ```json
//! {
//!   "global_root": "/mnt/library/_Elements/_2D",
//!   "projects_root": "/mnt/shows",
//!   "show": "MyShow",
//!   "ffmpeg": "/usr/bin/ffmpeg"
//! }
//! ```
//!
//! `show_root` may be given directly instead of `projects_root` + `show`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::library::LibraryKind;

/// Where show elements live below `<projects_root>/<show>`
pub const SHOW_ELEMENTS_SUBPATH: &str = "assets/_Elements/_2D";

/// Default config file name
pub const CONFIG_FILE: &str = "elemental.json";

/// Default log file name
pub const LOG_FILE: &str = "elemental.log";

/// Node placement constants used when building load plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Position of the first element's read step
    pub origin: (i64, i64),
    /// Horizontal gap between consecutive elements
    pub column_spacing: i64,
    /// Vertical drop from read to centering transform
    pub center_drop: i64,
    /// Vertical drop for follow-up steps (time shift, thumbnail render)
    pub step_drop: i64,
    /// Vertical drop from the averaged anchors to the switch
    pub switch_drop: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin: (0, 0),
            column_spacing: 100,
            center_drop: 100,
            step_drop: 35,
            switch_drop: 200,
        }
    }
}

/// Everything the ingestion core needs to know about the site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub global_root: PathBuf,
    pub show_root: PathBuf,
    pub ffmpeg: PathBuf,
    pub layout: LayoutConfig,
}

impl LibraryConfig {
    pub fn new(global_root: impl Into<PathBuf>, show_root: impl Into<PathBuf>) -> Self {
        Self {
            global_root: global_root.into(),
            show_root: show_root.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            layout: LayoutConfig::default(),
        }
    }

    /// Show root built as `<projects_root>/<show>/<SHOW_ELEMENTS_SUBPATH>`
    pub fn for_show(global_root: impl Into<PathBuf>, projects_root: &Path, show: &str) -> Self {
        Self::new(global_root, projects_root.join(show).join(SHOW_ELEMENTS_SUBPATH))
    }

    pub fn root(&self, kind: LibraryKind) -> &Path {
        match kind {
            LibraryKind::Global => &self.global_root,
            LibraryKind::Show => &self.show_root,
        }
    }
}

/// On-disk config, every field optional so CLI flags can fill gaps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub global_root: Option<PathBuf>,
    pub show_root: Option<PathBuf>,
    pub projects_root: Option<PathBuf>,
    pub show: Option<String>,
    pub ffmpeg: Option<PathBuf>,
    pub layout: Option<LayoutConfig>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `path` if it exists, empty config otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() { Self::load(path) } else { Ok(Self::default()) }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Resolve into a [`LibraryConfig`], failing when a root is missing
    pub fn into_config(self) -> Result<LibraryConfig> {
        let Some(global_root) = self.global_root else {
            bail!("No global library root configured (global_root)");
        };

        let show_root = match (self.show_root, self.projects_root, self.show) {
            (Some(root), _, _) => root,
            (None, Some(projects), Some(show)) => projects.join(show).join(SHOW_ELEMENTS_SUBPATH),
            _ => bail!("No show library configured (show_root, or projects_root + show)"),
        };

        let mut config = LibraryConfig::new(global_root, show_root);
        if let Some(ffmpeg) = self.ffmpeg {
            config.ffmpeg = ffmpeg;
        }
        if let Some(layout) = self.layout {
            config.layout = layout;
        }
        Ok(config)
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (ELEMENTAL_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("ELEMENTAL_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. ELEMENTAL_CONFIG_DIR environment variable
/// 3. Local folder IF any config files exist (elemental.json, elemental.log)
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs)
///
/// Same priority as [`config_file`], with the platform data directory last.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create configuration and data directories if they don't exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [CONFIG_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn local_dir() -> Option<PathBuf> {
    std::env::current_dir().ok().filter(|dir| has_local_config_files(dir))
}

/// Override dir, else local dir, else `<platform>/elemental`, else `.`
fn resolve_dir(config: &PathConfig, platform: impl FnOnce() -> Option<PathBuf>) -> PathBuf {
    config
        .config_dir
        .clone()
        .or_else(local_dir)
        .or_else(|| platform().map(|dir| dir.join("elemental")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir)
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir)
}
