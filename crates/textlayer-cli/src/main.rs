//! Textlayer CLI - run the OCR post-processing engine from the shell.
//!
//! Recognition is delegated to the system `tesseract` binary; everything
//! after recognition (noise filtering, recovery, reading order) is the
//! textlayer engine.
//!
//! # Commands
//!
//! - `extract`: OCR a single image into text or a full page-result JSON
//! - `batch`: process several images through the page pool
//! - `segment`: group a page into classified regions (balloon/sfx/text)
//! - `version`: engine and algorithm version
//!
//! # Configuration
//!
//! `--config path/to/textlayer.toml` or auto-discovery of `textlayer.toml`
//! in the current and parent directories. Command-line flags win over the
//! config file.
//!
//! # Exit codes
//!
//! 0 on success, non-zero on error (details on stderr).

#![deny(unsafe_code)]

mod tesseract;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use textlayer::{
    ALGORITHM_VERSION, CancelToken, DocumentType, OcrPipeline, OcrRequest, PageSegMode,
    PipelineConfig,
};

use tesseract::TesseractCliFactory;

/// Textlayer OCR post-processing CLI
#[derive(Parser)]
#[command(name = "textlayer")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PsmArg {
    Auto,
    SingleBlock,
    SingleLine,
    SingleWord,
    SparseText,
}

impl From<PsmArg> for PageSegMode {
    fn from(arg: PsmArg) -> Self {
        match arg {
            PsmArg::Auto => PageSegMode::Auto,
            PsmArg::SingleBlock => PageSegMode::SingleBlock,
            PsmArg::SingleLine => PageSegMode::SingleLine,
            PsmArg::SingleWord => PageSegMode::SingleWord,
            PsmArg::SparseText => PageSegMode::SparseText,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DocTypeArg {
    Manga,
    Document,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a searchable text layer from an image
    Extract {
        /// Path to the page image
        path: PathBuf,

        /// Path to config file (TOML). If not given, searches for
        /// textlayer.toml in the current and parent directories.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Recognizer languages, '+'-joined (e.g. "jpn+eng")
        #[arg(short, long)]
        language: Option<String>,

        /// Recognition DPI
        #[arg(long)]
        dpi: Option<u32>,

        /// Page segmentation mode override
        #[arg(long)]
        psm: Option<PsmArg>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Collect per-word drop records into the JSON output
        #[arg(long)]
        debug_drops: bool,
    },

    /// Process multiple images through the page pool
    Batch {
        /// Image paths, processed in order
        paths: Vec<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        language: Option<String>,

        #[arg(long)]
        dpi: Option<u32>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Segment a page into classified regions
    Segment {
        /// Path to the page image
        path: PathBuf,

        #[arg(short, long)]
        language: Option<String>,

        /// Page kind driving region classification
        #[arg(long, default_value = "manga")]
        document_type: DocTypeArg,
    },

    /// Show version information
    Version,
}

/// Subset of the pipeline configuration settable from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    language: Option<String>,
    dpi: Option<u32>,
    tesseract_binary: Option<String>,
    pipeline: Option<PipelineConfig>,
}

fn discover_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let mut dir = std::env::current_dir()?;
            loop {
                let candidate = dir.join("textlayer.toml");
                if candidate.is_file() {
                    break Some(candidate);
                }
                if !dir.pop() {
                    break None;
                }
            }
        }
    };

    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
        }
        None => Ok(FileConfig::default()),
    }
}

fn build_pipeline(file: &FileConfig) -> Result<Arc<OcrPipeline>> {
    let factory = Arc::new(TesseractCliFactory::new(
        file.tesseract_binary.as_deref().unwrap_or("tesseract"),
    ));
    let pipeline_config = file.pipeline.clone().unwrap_or_default();
    Ok(Arc::new(OcrPipeline::new(factory, pipeline_config)?))
}

fn build_request(
    file: &FileConfig,
    language: Option<String>,
    dpi: Option<u32>,
    psm: Option<PsmArg>,
    debug_drops: bool,
) -> OcrRequest {
    OcrRequest {
        language: language
            .or_else(|| file.language.clone())
            .unwrap_or_else(|| "eng".to_string()),
        dpi: dpi.or(file.dpi).unwrap_or(300),
        page_seg_mode: psm.map(PageSegMode::from),
        debug_collect_drops: debug_drops,
        ..Default::default()
    }
}

async fn run_extract(
    path: &Path,
    config: Option<&Path>,
    language: Option<String>,
    dpi: Option<u32>,
    psm: Option<PsmArg>,
    format: OutputFormat,
    debug_drops: bool,
) -> Result<()> {
    let file = discover_config(config)?;
    let pipeline = build_pipeline(&file)?;
    let request = build_request(&file, language, dpi, psm, debug_drops);
    tracing::debug!(path = %path.display(), language = %request.language, "extracting page");

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    let result = pipeline.ocr_page(&bytes, &request).await?;

    match format {
        OutputFormat::Text => println!("{}", result.text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

async fn run_batch(
    paths: &[PathBuf],
    config: Option<&Path>,
    language: Option<String>,
    dpi: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let file = discover_config(config)?;
    let pipeline = build_pipeline(&file)?;
    let request = build_request(&file, language, dpi, None, false);

    let mut pages = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read image {}", path.display()))?;
        pages.push((index as u32 + 1, bytes));
    }

    let results = pipeline.ocr_pages(pages, &request, &CancelToken::new()).await;

    let mut failures = 0usize;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(page) => match format {
                OutputFormat::Text => {
                    println!("=== {}", path.display());
                    println!("{}", page.text);
                }
                OutputFormat::Json => println!("{}", serde_json::to_string(&page)?),
            },
            Err(e) => {
                failures += 1;
                eprintln!("{}: {e}", path.display());
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} pages failed", paths.len());
    }
    Ok(())
}

async fn run_segment(path: &Path, language: Option<String>, doc_type: DocTypeArg) -> Result<()> {
    let file = discover_config(None)?;
    let pipeline = build_pipeline(&file)?;
    let language = language
        .or_else(|| file.language.clone())
        .unwrap_or_else(|| "eng".to_string());
    let document_type = match doc_type {
        DocTypeArg::Manga => DocumentType::Manga,
        DocTypeArg::Document => DocumentType::Document,
    };

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    let regions = pipeline.segment_page(&bytes, &language, document_type).await?;
    println!("{}", serde_json::to_string_pretty(&regions)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            path,
            config,
            language,
            dpi,
            psm,
            format,
            debug_drops,
        } => run_extract(&path, config.as_deref(), language, dpi, psm, format, debug_drops).await,
        Commands::Batch {
            paths,
            config,
            language,
            dpi,
            format,
        } => run_batch(&paths, config.as_deref(), language, dpi, format).await,
        Commands::Segment {
            path,
            language,
            document_type,
        } => run_segment(&path, language, document_type).await,
        Commands::Version => {
            println!("textlayer {}", env!("CARGO_PKG_VERSION"));
            println!("algorithm version {ALGORITHM_VERSION}");
            Ok(())
        }
    }
}
