use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use pixfeed_core::{FeedConfig, NormalizerKind};
use pixfeed_encode::ImageMagickNormalizer;
use pixfeed_server::{run_server, FeedService};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "pixfeed.toml";

#[derive(Parser)]
#[command(
    name = "pixfeed",
    version,
    about = "pixfeed - serves an upstream WebP feed as GIF/PNG for LED matrix displays"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (GET /feed, GET /healthz)
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Address to listen on, e.g. 0.0.0.0:8001
        #[arg(long)]
        bind: Option<String>,
    },
    /// Fetch and convert one image, writing it to a file
    Render {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show version, effective configuration and tool availability
    Info {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream WebP URL
    #[arg(long)]
    upstream: Option<String>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// GIF normalizer: coalesce, imagemagick or none
    #[arg(long)]
    normalizer: Option<NormalizerKind>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = load_config(&config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            run_async(run_server(config))
        }
        Commands::Render { config, output } => cmd_render(load_config(&config)?, &output),
        Commands::Info { config } => cmd_info(&load_config(&config)?),
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

/// Explicit `--config`, else `./pixfeed.toml` if present, else defaults;
/// command-line overrides on top; then validated.
fn load_config(args: &ConfigArgs) -> Result<FeedConfig> {
    let mut config = match &args.config {
        Some(path) => FeedConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            FeedConfig::load_from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("failed to load config {}", DEFAULT_CONFIG_FILE))?
        }
        None => FeedConfig::default(),
    };

    if let Some(url) = &args.upstream {
        config.upstream.url = url.clone();
    }
    if let Some(width) = args.width {
        config.output.width = width;
    }
    if let Some(height) = args.height {
        config.output.height = height;
    }
    if let Some(kind) = args.normalizer {
        config.normalizer.kind = kind;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_render(config: FeedConfig, output: &Path) -> Result<()> {
    let start = Instant::now();
    let service = FeedService::new(config);

    println!("🎯 Fetching {}", service.config().upstream.url);
    let image = service.render()?;

    let expected = image.format.extension();
    let actual = output.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !actual.eq_ignore_ascii_case(expected) {
        tracing::warn!(
            "Output is {} but {} has extension '{}'",
            image.format,
            output.display(),
            actual
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(output, &image.bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "✓ Wrote {} ({} frame(s), {} bytes, {}) in {:.2}s",
        output.display(),
        image.frame_count,
        image.bytes.len(),
        image.mime_type(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_info(config: &FeedConfig) -> Result<()> {
    println!("🖼  pixfeed");
    println!("   Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("   Listen:      {}", config.server.bind);
    println!("   Upstream:    {}", config.upstream.url);
    println!(
        "   Output:      {}x{} (default frame {} ms)",
        config.output.width, config.output.height, config.output.default_frame_ms
    );
    println!("   Normalizer:  {}", config.normalizer.kind);
    println!(
        "   ImageMagick: {}",
        if ImageMagickNormalizer::from_config(&config.normalizer).is_available() {
            "available ✓"
        } else {
            "NOT FOUND ✗"
        }
    );
    println!(
        "   WebP decode: {}",
        if pixfeed_render::ensure_webp_support().is_ok() {
            "available ✓"
        } else {
            "NOT AVAILABLE ✗"
        }
    );
    Ok(())
}
