use clap::{Parser, Subcommand};
use log::error;
use pixboard::cache::Rendition;
use pixboard::config::{self, AppConfig, Backend};
use pixboard::display::{DisplayState, Presented};
use pixboard::imaging::GifsicleConverter;
use pixboard::pipeline::{CachePipeline, PipelineError};
use pixboard::source::ImageSource;
use pixboard::worker::Worker;
use pixboard::{logging, output};
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Rendition override; without either flag `display.nearest` decides.
#[derive(clap::Args, Clone, Copy, Debug, Default)]
struct RenditionArgs {
    /// Use the smooth rendition instead of the configured default
    #[arg(long, conflicts_with = "nearest")]
    smooth: bool,

    /// Use the nearest-neighbor rendition instead of the configured default
    #[arg(long)]
    nearest: bool,
}

impl RenditionArgs {
    fn rendition(self, config: &AppConfig) -> Rendition {
        if self.smooth {
            Rendition::Smooth
        } else if self.nearest {
            Rendition::Nearest
        } else {
            config.display.rendition()
        }
    }
}

/// Shared flags for commands that resolve one image.
#[derive(clap::Args, Clone)]
struct ResolveArgs {
    #[command(flatten)]
    rendition: RenditionArgs,

    /// Print a JSON report instead of plain text
    #[arg(long)]
    json: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("PIXBOARD_ON_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("PIXBOARD_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pixboard")]
#[command(about = "Pixelated GIF renditions for retro display simulators, cached by content")]
#[command(long_about = "\
Pixelated GIF renditions for retro display simulators, cached by content

Every image is hashed (SHA-256) and converted once into two GIFs: a
downscale to 64px on the longer edge, capped at 256 colors, then scaled
back up 5x. The nearest rendition keeps hard pixel edges; the smooth one
interpolates on the way up.

Cache layout:

  $TMPDIR/pixboard/
  ├── <sha256>.gif                 # smooth rendition
  └── <sha256>.gif.nearest.gif     # nearest-neighbor rendition

Resolving the same content again, under any file name, is a cache hit.
At most one conversion runs at a time.

Run 'pixboard gen-config' to generate a documented pixboard.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = "pixboard.toml", global = true)]
    config: PathBuf,

    /// Cache directory, overrides the config file
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Converter backend, overrides the config file
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an image file to its cached rendition
    Resolve {
        path: PathBuf,
        #[command(flatten)]
        args: ResolveArgs,
    },
    /// Resolve base64-encoded image bytes ('-' reads stdin)
    Data {
        payload: String,
        #[command(flatten)]
        args: ResolveArgs,
    },
    /// Show images in order, keeping the last good one on failure
    Show {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        rendition: RenditionArgs,
    },
    /// Delete every cached rendition
    ClearCache,
    /// Validate config, cache directory and converter
    Check,
    /// Print a stock pixboard.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            for line in output::format_failure("error", err.as_ref()) {
                eprintln!("{}", line);
            }
            ExitCode::from(2)
        }
    }
}

/// Errors returned from here are fatal (exit 2). Failed resolves are
/// reported inline and exit 1.
fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    // gen-config must work even when the current config is broken.
    let mut config = match cli.command {
        Command::GenConfig => AppConfig::default(),
        _ => load_config(&cli)?,
    };

    match cli.command {
        Command::Resolve { path, args } => {
            let pipeline = CachePipeline::from_config(&config)?;
            resolve_one(&pipeline, &ImageSource::from_path(path), &args, &config)
        }
        Command::Data { payload, args } => {
            let text = if payload == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                payload
            };
            let source = match ImageSource::from_base64(&text) {
                Ok(source) => source,
                Err(e) => {
                    for line in output::format_failure("<base64>", &PipelineError::from(e)) {
                        eprintln!("{}", line);
                    }
                    return Ok(ExitCode::from(1));
                }
            };
            let pipeline = CachePipeline::from_config(&config)?;
            resolve_one(&pipeline, &source, &args, &config)
        }
        Command::Show { paths, rendition } => {
            let pipeline = Arc::new(CachePipeline::from_config(&config)?);
            show(pipeline, paths, rendition.rendition(&config), &config)
        }
        Command::ClearCache => {
            // Clearing converts nothing; skip the tool lookup.
            config.convert.backend = Backend::Native;
            let pipeline = CachePipeline::from_config(&config)?;
            let removed = pipeline.clear_cache()?;
            println!("{}", output::format_clear(removed, pipeline.cache().path()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let pipeline = CachePipeline::from_config(&config)?;
            let program = match config.convert.backend {
                Backend::Gifsicle => Some(
                    GifsicleConverter::new(&config.convert.tool, config.convert.timeout())?
                        .program()
                        .to_path_buf(),
                ),
                Backend::Native => None,
            };
            let report = output::CheckReport {
                config: cli.config.exists().then(|| cli.config.clone()),
                cache_dir: pipeline.cache().path().to_path_buf(),
                cache_files: std::fs::read_dir(pipeline.cache().path())?.count(),
                converter: pipeline.converter().name().to_string(),
                program,
            };
            output::print_check(&report);
            println!("==> Configuration is valid");
            Ok(ExitCode::SUCCESS)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn Error>> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = Some(std::path::absolute(dir)?);
    }
    if let Some(backend) = cli.backend {
        config.convert.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_one(
    pipeline: &CachePipeline,
    source: &ImageSource,
    args: &ResolveArgs,
    config: &AppConfig,
) -> Result<ExitCode, Box<dyn Error>> {
    match pipeline.resolve(source, args.rendition.rendition(config)) {
        Ok(resolved) => {
            if args.json {
                println!("{}", output::format_resolved_json(&resolved)?);
            } else {
                output::print_resolved(&resolved);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_fatal() => Err(err.into()),
        Err(err) => {
            for line in output::format_failure(&source.describe(), &err) {
                eprintln!("{}", line);
            }
            Ok(ExitCode::from(1))
        }
    }
}

/// A display session: every path is queued on the worker up front, then
/// each result is handed to the display state in order.
fn show(
    pipeline: Arc<CachePipeline>,
    paths: Vec<PathBuf>,
    rendition: Rendition,
    config: &AppConfig,
) -> Result<ExitCode, Box<dyn Error>> {
    let worker = Worker::new(Arc::clone(&pipeline))?;
    let mut state = DisplayState::new(config.display.mode, rendition);

    let pending: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let source = ImageSource::from_path(path);
            let label = source.describe();
            (label, worker.submit(source, state.rendition()))
        })
        .collect();

    let mut failed = false;
    for (i, (label, job)) in pending.into_iter().enumerate() {
        let presented = state.present(job.wait());
        if let Presented::Restored { error, .. } = &presented {
            if error.is_fatal() {
                error!("{}", error);
                return Ok(ExitCode::from(2));
            }
            failed = true;
        }
        std::thread::sleep(presented.delay());
        output::print_show_step(i + 1, &label, &presented);
    }

    println!();
    println!("{}", output::format_stats(&pipeline.stats()));
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
