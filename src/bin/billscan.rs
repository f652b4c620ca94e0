//! CLI binary for billscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one extraction, and prints the result.

use anyhow::{Context, Result};
use billscan::{extract_to_file, ExtractionConfig, DEFAULT_OUTPUT_PATH};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic extraction (writes output/extracted_data.json and prints it)
  billscan receipt.jpg

  # Choose the output file
  billscan receipt.jpg -o ledger/2026-03-lunch.json

  # Use a different model, longer timeout
  billscan --model gemini-2.5-pro --api-timeout 120 receipt.jpg

  # Submit the binarized intermediate instead of the original photo
  billscan --submit-normalized receipt.jpg

  # Custom prompt from a file
  billscan --prompt my_prompt.txt receipt.jpg

OUTPUT:
  The extracted record is written as indented JSON to the output path
  (fully overwritten on each run) and echoed to stdout. The normalized
  intermediate image is saved next to the source as <name>_processed.png
  for inspection.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          API key for the extraction service (required)
  BILLSCAN_MODEL          Override model ID
  BILLSCAN_OUTPUT         Override output path

SETUP:
  1. Set API key:     export GEMINI_API_KEY=...
  2. Extract:         billscan receipt.jpg
"#;

/// Extract structured expense data from a bill or receipt photo.
#[derive(Parser, Debug)]
#[command(
    name = "billscan",
    version,
    about = "Extract structured expense data from bill photos using Vision LLMs",
    long_about = "Extract vendor, date, total, tax details and itemized lines from a photo \
or scan of a paper bill, using a Vision Language Model as the recognition engine. \
The result is validated JSON written to a file and echoed to stdout.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the bill image (JPEG, PNG, WebP, GIF, BMP, TIFF).
    input: PathBuf,

    /// Write the extracted JSON to this file.
    #[arg(short, long, env = "BILLSCAN_OUTPUT", default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Model ID (e.g. gemini-2.0-flash, gemini-2.5-pro).
    #[arg(long, env = "BILLSCAN_MODEL", default_value = "gemini-2.0-flash")]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "BILLSCAN_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Max model output tokens.
    #[arg(long, env = "BILLSCAN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Retries on transient service failure.
    #[arg(long, env = "BILLSCAN_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Service call timeout in seconds.
    #[arg(long, env = "BILLSCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Submit the normalized (binarized) image to the model instead of the
    /// original photo.
    #[arg(long, env = "BILLSCAN_SUBMIT_NORMALIZED")]
    submit_normalized: bool,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "BILLSCAN_PROMPT")]
    prompt: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "BILLSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BILLSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result JSON.
    #[arg(short, long, env = "BILLSCAN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // spinner and the summary line provide the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;

    // ── Run extraction with a spinner ────────────────────────────────────
    let spinner = if show_progress {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Extracting");
        bar.set_message(cli.input.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let result = extract_to_file(&cli.input, &cli.output, &config).await;

    if let Some(ref bar) = spinner {
        bar.finish_and_clear();
    }

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{} [{}] {}", red("✘"), e.stage(), e);
            std::process::exit(1);
        }
    };

    // ── Report the result ────────────────────────────────────────────────
    let json = serde_json::to_string_pretty(&output.bill).context("failed to serialise result")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(json.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .context("failed to write to stdout")?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  {}ms  →  {}",
            green("✔"),
            bold(&format!("{} line items", output.bill.line_items.len())),
            output.stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  {}",
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
            dim(&format!(
                "(normalized image: {})",
                output.normalized_path.display()
            )),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .submit_normalized(cli.submit_normalized);

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read prompt from {path:?}"))?;
        builder = builder.prompt(prompt);
    }

    builder.build().context("invalid configuration")
}
