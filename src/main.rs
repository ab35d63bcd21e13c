use elemental::cli::{Args, Command};
use elemental::config::{self, ConfigFile, LibraryConfig, PathConfig};
use elemental::copy::CopyEngine;
use elemental::ingest::{IngestRequest, Ingestor};
use elemental::library::{self, LibraryKind};
use elemental::sequence;
use elemental::sidecar::{CenterCurve, ElementSidecar, SidecarStore};
use elemental::thumbs::{self, FfmpegEncoder, PreviewOutcome};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins when set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Config file values with CLI root overrides applied
fn load_config(args: &Args, path_config: &PathConfig) -> Result<LibraryConfig> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| config::config_file(config::CONFIG_FILE, path_config));
    info!("Config path: {}", path.display());

    let mut file = if args.config.is_some() {
        ConfigFile::load(&path)?
    } else {
        ConfigFile::load_or_default(&path)?
    };
    if let Some(root) = &args.global_root {
        file.global_root = Some(root.clone());
    }
    if let Some(root) = &args.show_root {
        file.show_root = Some(root.clone());
    }
    file.into_config()
}

fn print_names(names: &[String]) {
    for name in names {
        println!("{}", name);
    }
}

fn run(args: Args, config: LibraryConfig) -> Result<()> {
    match args.command {
        Command::Categories { library } => {
            print_names(&library::categories(config.root(library)));
        }

        Command::List { category, search, library } => {
            let names = library::elements(config.root(library), &category);
            match search {
                Some(text) => print_names(&library::search(&names, &text)),
                None => print_names(&names),
            }
        }

        Command::Detect { dir } => {
            let desc = sequence::detect_in_dir(&dir)?;
            println!("{}", serde_json::to_string_pretty(&desc)?);
        }

        Command::Load { category, names, mode, start_frame, copy_on_load, prefer } => {
            let request = IngestRequest::new(category, names, start_frame)?
                .with_mode(mode)
                .with_copy_on_load(copy_on_load)
                .prefer(prefer);
            let outcome = Ingestor::new(config).ingest(&request)?;

            for skipped in &outcome.skipped {
                warn!("{}", skipped);
            }
            for (element, fallback) in outcome.fallbacks() {
                warn!("{}: {}", element, fallback);
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Copy { category, names } => {
            let engine = CopyEngine::new();
            let mut failures = 0;
            for name in &names {
                match engine.copy_element(&config.global_root, &category, name, &config.show_root) {
                    Ok(report) => println!("{}: {} files -> {}", name, report.copied.len(), report.destination.display()),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", name, e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} element(s) failed to copy", failures, names.len());
            }
        }

        Command::Thumbs { category, names, library } => {
            let root = config.root(library);
            let names = if names.is_empty() { library::elements(root, &category) } else { names };
            let encoder = FfmpegEncoder::new(&config.ffmpeg);

            for (name, result) in thumbs::generate_previews(root, &category, &names, &encoder) {
                match result {
                    Ok(PreviewOutcome::Written(path)) => println!("{}: wrote {}", name, path.display()),
                    Ok(PreviewOutcome::Skipped(path)) => println!("{}: kept {}", name, path.display()),
                    Err(e) => eprintln!("{}: {}", name, e),
                }
            }
        }

        Command::Sidecar { category, name, point, library } => {
            let dir = library::element_dir(config.root(library), &category, &name);
            write_sidecar(&dir, &name, point)?;
        }
    }
    Ok(())
}

fn write_sidecar(dir: &Path, name: &str, point: Option<Vec<f64>>) -> Result<()> {
    let desc = sequence::detect_in_dir(dir)?;
    let size = desc
        .resolution(dir)
        .with_context(|| format!("Failed to read the resolution of {}", desc.pattern))?;
    let curve = match point.as_deref() {
        Some([x, y]) => Some(CenterCurve::fixed([*x, *y])),
        Some(_) => bail!("--point takes exactly two values"),
        None => None,
    };

    let sidecar = ElementSidecar::from_descriptor(dir, name, &desc, size, curve);
    let path = SidecarStore::write(&sidecar)?;
    println!("{}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let config = load_config(&args, &path_config)?;
    debug!(
        "{}: {}, {}: {}",
        LibraryKind::Global,
        config.global_root.display(),
        LibraryKind::Show,
        config.show_root.display()
    );

    run(args, config)
}
