use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tendon_core::{
    write_outputs, Annotator, CsvExportConfig, DocumentProcessor, DocumentResult, LengthUnit, PipelineConfig,
    PipelineError, ReplayDetector, TextDetector,
};
use tendon_render::{open_rasterizer, Rasterizer};
use tendon_scheduler::{CancellationToken, ChannelProgress, ProgressUpdate};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tendon-extract")]
#[command(about = "Detect tendon callouts on structural drawings and measure their lines")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process a drawing set and write annotated pages, CSV and JSON results.
    Extract(ExtractArgs),
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// PDF drawing set or single raster (PNG, JPEG, TIFF).
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Text detector: `replay:<json>` or `tesseract`.
    #[arg(long, value_parser = parse_ocr, default_value = "tesseract")]
    ocr: OcrBackend,
    #[arg(long)]
    dpi: Option<u32>,
    #[arg(long)]
    tile_size: Option<u32>,
    #[arg(long)]
    overlap: Option<u32>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    unit: Option<LengthUnit>,
    #[arg(long)]
    precision: Option<usize>,
    /// Process pages concurrently.
    #[arg(long)]
    parallel: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum OcrBackend {
    Replay(PathBuf),
    Tesseract,
}

fn parse_ocr(value: &str) -> std::result::Result<OcrBackend, String> {
    match value.split_once(':') {
        Some(("replay", path)) if !path.is_empty() => Ok(OcrBackend::Replay(PathBuf::from(path))),
        _ if value == "tesseract" => Ok(OcrBackend::Tesseract),
        _ => Err(format!("expected `replay:<json>` or `tesseract`, got `{value}`")),
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Extract(args) => run_extract(&args),
        Commands::Config { config } => run_config(config.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // A second initialisation (in-process callers) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = PipelineConfig::load(path).context("failed to load configuration")?;
    Ok(config)
}

fn run_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    config.validate().context("invalid configuration")?;
    print!("{}", config.to_toml().context("failed to render configuration")?);
    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &ExtractArgs) {
    if let Some(dpi) = args.dpi {
        config.raster.dpi = dpi;
    }
    if let Some(tile_size) = args.tile_size {
        config.tiling.tile_size = tile_size;
    }
    if let Some(overlap) = args.overlap {
        config.tiling.overlap = overlap;
    }
    if let Some(batch_size) = args.batch_size {
        config.ocr.batch_size = batch_size;
    }
    if let Some(unit) = args.unit {
        config.measurement.unit = unit;
    }
    if let Some(precision) = args.precision {
        config.measurement.precision = precision;
    }
    if args.parallel {
        config.pipeline.parallel_pages = true;
    }
}

fn build_detector(backend: &OcrBackend) -> Result<Box<dyn TextDetector>> {
    match backend {
        OcrBackend::Replay(path) => {
            let detector = ReplayDetector::from_file(path)
                .with_context(|| format!("failed to load OCR replay {}", path.display()))?;
            tracing::info!(path = %path.display(), detections = detector.len(), "using replayed OCR");
            Ok(Box::new(detector))
        }
        #[cfg(feature = "tesseract")]
        OcrBackend::Tesseract => {
            let detector = tendon_core::TesseractDetector::new(tendon_core::TesseractConfig::default())
                .context("failed to initialise Tesseract")?;
            Ok(Box::new(detector))
        }
        #[cfg(not(feature = "tesseract"))]
        OcrBackend::Tesseract => {
            anyhow::bail!("tesseract support is not compiled in; rebuild with `--features tesseract` or pass `--ocr replay:<json>`")
        }
    }
}

/// Log progress updates off the worker threads
fn spawn_progress_logger(receiver: mpsc::Receiver<ProgressUpdate>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for update in receiver {
            tracing::info!(percent = update.percent(), stage = %update.stage, "{}", update.message);
        }
    })
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    config.validate().context("invalid configuration")?;

    let detector = build_detector(&args.ocr)?;
    let annotator = Annotator::new(config.annotation.clone()).context("failed to load annotation font")?;
    let rasterizer = open_rasterizer(&args.input, config.raster.dpi)
        .with_context(|| format!("failed to open {}", args.input.display()))?;

    let (sender, receiver) = mpsc::channel();
    let logger = spawn_progress_logger(receiver);
    let progress = ChannelProgress::new(sender);
    let cancel = CancellationToken::new();

    let processor = DocumentProcessor::new(&config, detector.as_ref(), &annotator);
    let outcome = if config.pipeline.parallel_pages {
        let pages = rasterizer
            .render_all(&progress)
            .with_context(|| format!("failed to rasterize {}", args.input.display()))?;
        processor.process_document(rasterizer.document_id(), pages, &progress, &cancel)
    } else {
        process_lazily(&processor, rasterizer.as_ref(), &progress, &cancel)
    };
    let result = outcome.context("processing failed")?;
    write_outputs(&args.output, &result, &CsvExportConfig::default(), &progress)
        .with_context(|| format!("failed to write results to {}", args.output.display()))?;

    drop(progress);
    let _ = logger.join();

    let measured = result.records().filter(|r| r.measurement.value.is_some()).count();
    let failed = match result.failures.len() {
        0 => String::new(),
        n => format!(", {n} pages failed"),
    };
    println!(
        "Detected {} tendons on {} pages ({} measured{}); results in {}",
        result.total_tendons(),
        result.total_pages(),
        measured,
        failed,
        args.output.display()
    );
    Ok(())
}

/// Render and process one page at a time so a single raster is alive at once
fn process_lazily(
    processor: &DocumentProcessor<'_>,
    rasterizer: &dyn Rasterizer,
    progress: &ChannelProgress,
    cancel: &CancellationToken,
) -> std::result::Result<DocumentResult, PipelineError> {
    processor.process_lazily(
        rasterizer.document_id(),
        rasterizer.page_count(),
        |index| {
            rasterizer.render_page(index).map_err(|e| PipelineError::Load {
                page: index as u32,
                reason: e.to_string(),
            })
        },
        progress,
        cancel,
    )
}
