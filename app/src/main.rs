// ==============================================================================
// main.rs - Pharmacogenomic Engine CLI
// ==============================================================================
// Description: Command line entry point: analyze a variant file for a drug, or
//              describe the loaded knowledge base
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Results go to stdout as JSON; logs and audit records go to stderr.
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use pgx_engine::report;
use pgx_engine::validator::check_input_size;
use pgx_engine::{AnalysisEngine, AnalysisError, EngineConfig, KnowledgeBase};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pharmacogenomic variant-to-recommendation engine", long_about = None)]
struct Cli {
    /// Knowledge base JSON file (defaults to the built-in demonstration set)
    #[arg(long, env = "PGX_KNOWLEDGE_BASE", global = true)]
    knowledge_base: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a VCF file (plain or gzip) for one drug
    Analyze(AnalyzeArgs),

    /// Print knowledge base version, fingerprint and contents
    KbInfo {
        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Variant file
    #[arg(long)]
    vcf: PathBuf,

    /// Drug name
    #[arg(long)]
    drug: String,

    /// Comma-separated co-medications
    #[arg(long, default_value = "")]
    co_medications: String,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Maximum decompressed variant file size in bytes
    #[arg(long, env = "PGX_MAX_INPUT_BYTES", default_value_t = 50 * 1024 * 1024)]
    max_input_bytes: u64,

    /// Variant file read budget in seconds
    #[arg(long, env = "PGX_READ_TIMEOUT_SECS", default_value_t = 30)]
    read_timeout_secs: u64,

    /// Whole-analysis budget in seconds
    #[arg(long, env = "PGX_ANALYSIS_TIMEOUT_SECS", default_value_t = 60)]
    analysis_timeout_secs: u64,

    /// Calls below this QUAL lower confidence
    #[arg(long, env = "PGX_MIN_CALL_QUALITY", default_value_t = 20.0)]
    min_call_quality: f64,
}

impl AnalyzeArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_input_bytes(self.max_input_bytes)
            .with_read_timeout_secs(self.read_timeout_secs)
            .with_analysis_timeout_secs(self.analysis_timeout_secs)
            .with_min_call_quality(self.min_call_quality)
    }
}

fn load_knowledge_base(path: Option<&Path>) -> Result<KnowledgeBase> {
    match path {
        Some(path) => KnowledgeBase::open(path)
            .with_context(|| format!("Failed to load knowledge base {}", path.display())),
        None => KnowledgeBase::builtin().context("Built-in knowledge base is invalid"),
    }
}

/// Read at most `max_bytes + 1` bytes so an oversized file is never loaded whole
async fn read_variant_file(
    path: &Path,
    size: u64,
    max_bytes: u64,
) -> std::io::Result<Zeroizing<Vec<u8>>> {
    let limit = max_bytes.saturating_add(1);
    let file = tokio::fs::File::open(path).await?;
    let capacity = usize::try_from(size.min(limit)).unwrap_or(0);
    let mut buffer = Zeroizing::new(Vec::with_capacity(capacity));
    file.take(limit).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

fn analysis_failed(e: &AnalysisError) -> ExitCode {
    error!("Analysis failed: {}", e);
    eprintln!("error: {}", e.user_message());
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    // Initialize tracing (stderr keeps stdout for results)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgx_engine=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let kb = load_knowledge_base(cli.knowledge_base.as_deref())?;

    match cli.command {
        Command::KbInfo { pretty } => {
            let summary = kb.summary();
            let json = if pretty {
                serde_json::to_string_pretty(&summary)?
            } else {
                serde_json::to_string(&summary)?
            };
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze(args) => {
            let engine = AnalysisEngine::new(Arc::new(kb), args.engine_config());
            info!(
                "pgx-engine starting (knowledge base {})",
                engine.knowledge_base_version()
            );

            let size = tokio::fs::metadata(&args.vcf)
                .await
                .with_context(|| format!("Failed to stat variant file {}", args.vcf.display()))?
                .len();
            if let Err(e) = check_input_size(size, args.max_input_bytes) {
                return Ok(analysis_failed(&AnalysisError::from(e)));
            }
            let variant_file = read_variant_file(&args.vcf, size, args.max_input_bytes)
                .await
                .with_context(|| format!("Failed to read variant file {}", args.vcf.display()))?;

            match engine
                .analyze_with_timeout(variant_file, args.drug, args.co_medications)
                .await
            {
                Ok(result) => {
                    let json = report::to_json(&result, args.pretty)
                        .context("Failed to serialize analysis result")?;
                    println!("{}", json);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(analysis_failed(&e)),
            }
        }
    }
}
