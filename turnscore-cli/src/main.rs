// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Turnscore CLI
//!
//! Batch evaluation of a conversation file against an evidence file, plus
//! the live server and configuration inspection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use turnscore_core::EvalConfig;
use turnscore_evals::{Engine, Evaluation, HeuristicTokenCounter};
use turnscore_server::{
    config::{LogFormat, ServerConfig},
    init_tracing,
    persist::{sanitize_basename, write_reports, SavedPaths},
    run_server, DEFAULT_LOG_FILTER,
};

const VERBOSE_LOG_FILTER: &str =
    "turnscore=debug,turnscore_core=debug,turnscore_evals=debug,turnscore_server=debug,tower_http=debug";

#[derive(Parser)]
#[command(name = "turnscore")]
#[command(about = "Turnscore - evaluate assistant replies against retrieved evidence", long_about = None)]
struct Cli {
    /// Configuration file (TOML; `[evaluation]` and `[embedding]` sections are used)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a conversation and write full, clean and HTML reports
    Evaluate {
        /// Conversation JSON file
        #[arg(long)]
        conv: PathBuf,

        /// Evidence (context vectors) JSON file
        #[arg(long)]
        context: PathBuf,

        /// Full report path; the clean JSON and HTML are written beside it
        #[arg(long, default_value = "combined_report.json")]
        out: PathBuf,

        /// Lower bound of the `weak` evidence tier
        #[arg(long)]
        hallucination_threshold: Option<f64>,

        /// Evidence chunks kept for the top-K cost estimate
        #[arg(long)]
        top_k: Option<usize>,

        /// Input price in USD per 1K tokens
        #[arg(long)]
        input_price: Option<f64>,

        /// Output price in USD per 1K tokens
        #[arg(long)]
        output_price: Option<f64>,

        /// Evaluate only the first N pairs
        #[arg(long)]
        max_pairs: Option<usize>,

        /// Score pairs concurrently
        #[arg(long)]
        parallel: bool,

        /// Print the clean report as JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server
    Serve {
        /// HTTP listen address (overrides config file)
        #[arg(long, env = "TURNSCORE_HTTP_ADDR")]
        http_addr: Option<String>,

        /// Directory for saved reports (overrides config file)
        #[arg(long, env = "TURNSCORE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Print the effective evaluation configuration as TOML
    Config,
}

/// Evaluation settings given on the command line
#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    hallucination_threshold: Option<f64>,
    top_k: Option<usize>,
    input_price: Option<f64>,
    output_price: Option<f64>,
    max_pairs: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut EvalConfig) {
        if let Some(weak) = self.hallucination_threshold {
            config.hallucination_thresholds.weak = weak;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(price) = self.input_price {
            config.input_per_1k_tokens_usd = price;
        }
        if let Some(price) = self.output_price {
            config.output_per_1k_tokens_usd = price;
        }
        if self.max_pairs.is_some() {
            config.max_pairs = self.max_pairs;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.clone())?;
    if cli.log_json {
        config.logging.format = LogFormat::Json;
    }
    let filter = if cli.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    init_tracing(config.logging.format, filter)?;

    match cli.command {
        Commands::Evaluate {
            conv,
            context,
            out,
            hallucination_threshold,
            top_k,
            input_price,
            output_price,
            max_pairs,
            parallel,
            json,
        } => {
            let overrides = Overrides {
                hallucination_threshold,
                top_k,
                input_price,
                output_price,
                max_pairs,
            };
            let (evaluation, saved) = evaluate(&config, overrides, &conv, &context, &out, parallel)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&evaluation.clean)?);
            } else {
                print_summary(&evaluation, &saved);
            }
        }

        Commands::Serve {
            http_addr,
            output_dir,
        } => {
            if let Some(addr) = http_addr {
                config.server.listen_addr = addr;
            }
            if let Some(dir) = output_dir {
                config.persistence.output_dir = dir;
            }
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(run_server(config))?;
        }

        Commands::Config => {
            config
                .evaluation
                .validate()
                .context("invalid evaluation configuration")?;
            print!("{}", toml::to_string_pretty(&config.evaluation)?);
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Split `--out` into the target directory and a sanitized file stem
fn output_target(out: &Path) -> Result<(PathBuf, String)> {
    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = out
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("--out {} has no file name", out.display()))?;
    let stem = sanitize_basename(name)?;
    Ok((dir, stem))
}

fn evaluate(
    config: &ServerConfig,
    overrides: Overrides,
    conv: &Path,
    context: &Path,
    out: &Path,
    parallel: bool,
) -> Result<(Evaluation, SavedPaths)> {
    let mut eval_config = config.evaluation.clone();
    overrides.apply(&mut eval_config);

    let (dir, stem) = output_target(out)?;
    let conversation = read_json(conv)?;
    let evidence = read_json(context)?;

    let embedder = config.embedding.build()?;
    let engine = Engine::new(eval_config, embedder, Arc::new(HeuristicTokenCounter::new()))
        .context("invalid evaluation configuration")?;
    info!(
        conversation = %conv.display(),
        evidence = %context.display(),
        embedding_backend = engine.embedding_backend(),
        parallel,
        "Evaluating conversation"
    );

    let evaluation = if parallel {
        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        runtime.block_on(engine.evaluate_parallel(&conversation, &evidence))?
    } else {
        engine.evaluate(&conversation, &evidence)?
    };

    let saved = write_reports(&dir, &stem, &evaluation.full, &evaluation.clean)?;
    Ok((evaluation, saved))
}

fn print_summary(evaluation: &Evaluation, saved: &SavedPaths) {
    let clean = &evaluation.clean;
    println!("{}", clean.summary);
    println!(
        "Flagged for review: {} of {} pair(s)",
        clean.flagged_pairs.len(),
        clean.aggregates.pair_count
    );
    for flagged in &clean.flagged_pairs {
        println!("  - pair {}: {}", flagged.pair_index, flagged.reason);
    }
    for warning in &clean.warnings {
        println!("Warning: {}", warning);
    }
    println!("✓ Full report:  {}", saved.combined.display());
    println!("✓ Clean report: {}", saved.clean_json.display());
    println!("✓ HTML report:  {}", saved.clean_html.display());
}
