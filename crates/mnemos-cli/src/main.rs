//! `mnemos-cli` – Mnemos Command Line Interface
//!
//! Interactive front-end for the knowledge and memory engine. It:
//!
//! 1. Loads `~/.mnemos/config.toml`, writing a default one on first run.
//! 2. Probes the local Ollama instance and, when the configured embedding
//!    model is available, uses it for embeddings. Otherwise the engine runs on
//!    its deterministic fallback embedding.
//! 3. Drops the user into an **interactive REPL** (`/store`, `/recall`,
//!    `/session`, `/remember`, `/consolidate`, …).
//! 4. Intercepts **Ctrl-C** to cancel in-flight work and exit cleanly.

mod config;
mod ollama;
mod repl;
mod telemetry;

use colored::Colorize;
use mnemos_memory::MemoryContext;
use mnemos_memory::predictor::EmbeddingPredictor;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::ollama::OllamaEmbedder;

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("mnemos");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── Config ────────────────────────────────────────────────────────────
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Ollama discovery ──────────────────────────────────────────────────
    let embedder = if cfg.use_ollama {
        probe_ollama(&mut cfg)
    } else {
        println!("  Ollama disabled in config; using fallback embeddings.");
        None
    };

    // ── Memory engine ─────────────────────────────────────────────────────
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut builder = MemoryContext::builder(cfg.memory.clone());
    if let Some(embedder) = embedder {
        builder = builder.embedding_predictor(embedder);
    }
    let ctx = match builder.build() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}: {}", "Invalid memory configuration".red(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(dimension = cfg.memory.dimension, "mnemos ready");

    println!(
        "  Embedding dimension {}, working capacity {}.",
        cfg.memory.dimension.to_string().bold(),
        cfg.memory.working_capacity.to_string().bold()
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(ctx, rt, shutdown);
    ExitCode::SUCCESS
}

fn probe_ollama(cfg: &mut config::Config) -> Option<EmbeddingPredictor> {
    print!("\n  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    match ollama::fetch_models(&cfg.ollama_url) {
        Ok(models) if ollama::has_model(&models, &cfg.embedding_model) => {
            println!(
                "{} (embedding with {})",
                "online".green(),
                cfg.embedding_model.bold()
            );
            match ollama::embedding_dimension(&cfg.ollama_url, &cfg.embedding_model) {
                Ok(dim) => {
                    if let Some(previous) = cfg.adopt_embedding_dimension(dim) {
                        println!(
                            "  Embedding dimension set to {} to match {} (config had {}).",
                            dim.to_string().bold(),
                            cfg.embedding_model.bold(),
                            previous
                        );
                    }
                    Some(Arc::new(OllamaEmbedder::new(
                        &cfg.ollama_url,
                        &cfg.embedding_model,
                    )))
                }
                Err(e) => {
                    warn!(error = %e, "embedding dimension check failed");
                    println!(
                        "  {} Using deterministic fallback embeddings.",
                        format!("Model {} did not answer an embedding request.", cfg.embedding_model)
                            .dimmed()
                    );
                    None
                }
            }
        }
        Ok(_) => {
            println!("{}", "online".green());
            println!(
                "  Model {} not found. Run `{}` to enable model embeddings.",
                cfg.embedding_model.yellow(),
                format!("ollama pull {}", cfg.embedding_model).bold()
            );
            None
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            warn!(error = %e, "ollama probe failed");
            println!(
                "  {} Using deterministic fallback embeddings.",
                "No Ollama instance detected.".dimmed()
            );
            None
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"  _ __ ___  _ __   ___ _ __ ___   ___  ___ "#.bold().cyan());
    println!("{}", r#" | '_ ` _ \| '_ \ / _ \ '_ ` _ \ / _ \/ __|"#.bold().cyan());
    println!("{}", r#" | | | | | | | | |  __/ | | | | | (_) \__ \"#.bold().cyan());
    println!("{}", r#" |_| |_| |_|_| |_|\___|_| |_| |_|\___/|___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Mnemos".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Semantic knowledge graph and session memory");
    println!();
}
