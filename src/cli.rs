use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ingest::LoadMode;
use crate::library::LibraryKind;

// Build version with format info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Headers: image 0.25 (EXR, PNG, JPEG, TIFF, TGA, HDR)\n",
    "Previews: external ffmpeg\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// 2D element library browser and ingestion planner
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: elemental.json in the config directory)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Global library root (overrides the config file)
    #[arg(short = 'g', long = "global", value_name = "DIR", global = true)]
    pub global_root: Option<PathBuf>,

    /// Show library root (overrides the config file)
    #[arg(short = 's', long = "show", value_name = "DIR", global = true)]
    pub show_root: Option<PathBuf>,

    /// Enable debug logging to file (default: elemental.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", require_equals = true, global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List categories of a library
    Categories {
        #[arg(long, value_name = "global|show", default_value = "global", value_parser = parse_library)]
        library: LibraryKind,
    },

    /// List elements of a category
    List {
        category: String,

        /// Case-insensitive name filter
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,

        #[arg(long, value_name = "global|show", default_value = "global", value_parser = parse_library)]
        library: LibraryKind,
    },

    /// Detect the authoritative sequence of a directory
    Detect {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Build a load plan and print it as JSON
    Load {
        category: String,

        #[arg(value_name = "ELEMENT", required = true)]
        names: Vec<String>,

        /// standard, switch, centered, centered-switch or thumb-setup
        #[arg(short = 'm', long, default_value = "standard")]
        mode: LoadMode,

        /// Frame the loaded elements should start on
        #[arg(long = "start", value_name = "N", default_value_t = 1001)]
        start_frame: i64,

        /// Copy elements into the show library before loading
        #[arg(long = "copy")]
        copy_on_load: bool,

        #[arg(long, value_name = "global|show", default_value = "show", value_parser = parse_library)]
        prefer: LibraryKind,
    },

    /// Copy elements from the global into the show library
    Copy {
        category: String,

        #[arg(value_name = "ELEMENT", required = true)]
        names: Vec<String>,
    },

    /// Render missing GIF previews with ffmpeg
    Thumbs {
        category: String,

        /// Elements to render (default: the whole category)
        #[arg(value_name = "ELEMENT")]
        names: Vec<String>,

        #[arg(long, value_name = "global|show", default_value = "global", value_parser = parse_library)]
        library: LibraryKind,
    },

    /// Write a static centering sidecar for an element
    Sidecar {
        category: String,
        name: String,

        /// Source point (default: image center)
        #[arg(long, value_names = ["X", "Y"], num_args = 2)]
        point: Option<Vec<f64>>,

        #[arg(long, value_name = "global|show", default_value = "global", value_parser = parse_library)]
        library: LibraryKind,
    },
}

fn parse_library(s: &str) -> Result<LibraryKind, String> {
    match s.to_lowercase().as_str() {
        "global" | "g" => Ok(LibraryKind::Global),
        "show" | "s" => Ok(LibraryKind::Show),
        other => Err(format!("unknown library '{}' (expected global or show)", other)),
    }
}
