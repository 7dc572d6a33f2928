pub mod config;
pub mod errors;
pub mod frame;
pub mod image_logger;
pub mod logging;
pub mod runtime;
pub mod verbosity;

use clap::{error::ErrorKind, ArgAction, Parser};
use config::{install_config, load_config, ConfigSources, EnvMap};
use errors::StbtError;
use image::imageops::FilterType;
use image::DynamicImage;
use image_logger::{ImageLogger, MetadataValue};
use logging::{init_structured_logging, log_event};
use runtime::DebugRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};
use verbosity::{debug_level, debug_to, VerboseCounter};

#[derive(Debug, Clone, Parser)]
#[command(name = "stbt-logging")]
#[command(about = "Save images into the stbt-debug directory tree for offline inspection")]
pub struct Cli {
    /// Enable debug output (specify twice to enable image dumps to ./stbt-debug directory)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    /// Writes structured logging data to the given filename as newline delimited JSON objects
    #[arg(long, value_name = "FILENAME")]
    pub structured_logging: Option<PathBuf>,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value = "dump")]
    pub name: String,
    #[arg(long, default_value_t = 0)]
    pub pyramid_levels: u32,
    pub images: Vec<PathBuf>,
}

pub fn run() -> Result<i32, StbtError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let runtime = DebugRuntime::new();
    run_with_runtime(&args, &env, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    runtime: &DebugRuntime,
) -> Result<i32, StbtError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(StbtError::Cli(error.to_string())),
        },
    };

    let env_map = env_to_map(env);
    let sources = ConfigSources::resolve(&env_map, cli.config.clone());
    install_config(load_config(&sources, runtime.file_system.as_ref())?);

    let mut counter = VerboseCounter::new();
    for _ in 0..cli.verbose {
        counter.increment();
    }
    let level = debug_level()?;

    if let Some(path) = &cli.structured_logging {
        init_structured_logging(path)?;
    }
    log_event(
        "info",
        "start",
        json!({ "debug_level": level, "images": cli.images.len() }),
    );

    let stream = runtime.error_stream.as_ref();
    debug_to(stream, &format!("debug level {level}"))?;

    for path in &cli.images {
        record_image(runtime, &cli, path)?;
    }
    Ok(0)
}

fn record_image(runtime: &DebugRuntime, cli: &Cli, path: &Path) -> Result<(), StbtError> {
    let stream = runtime.error_stream.as_ref();
    let bytes = runtime.file_system.read_bytes(path)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| StbtError::UnsupportedImage(format!("{}: {e}", path.display())))?;
    debug_to(
        stream,
        &format!(
            "loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        ),
    )?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mut logger = ImageLogger::with_runtime(
        runtime,
        &cli.name,
        [("source", MetadataValue::from(path.display().to_string()))],
    )?;
    logger.set([("width", image.width()), ("height", image.height())]);

    logger.imwrite(&stem, &image, None)?;
    let mut level_image = image;
    for level in 1..=cli.pyramid_levels {
        if level_image.width() < 2 || level_image.height() < 2 {
            break;
        }
        level_image = pyramid_down(&level_image);
        logger.imwrite(&stem, &level_image, Some(level))?;
    }

    if let Some(manifest) = logger.write_manifest()? {
        log_event(
            "info",
            "recorded",
            json!({
                "name": cli.name,
                "frame_number": logger.frame_number(),
                "images": logger.image_names(),
                "manifest": manifest.display().to_string(),
            }),
        );
        debug_to(
            stream,
            &format!(
                "saved {} image(s) to {}",
                logger.image_names().len(),
                manifest.parent().unwrap_or(Path::new(".")).display()
            ),
        )?;
    }
    Ok(())
}

/// Half-resolution copy for the next pyramid level.
pub fn pyramid_down(image: &DynamicImage) -> DynamicImage {
    image.resize_exact(
        (image.width() / 2).max(1),
        (image.height() / 2).max(1),
        FilterType::Triangle,
    )
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
