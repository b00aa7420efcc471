//! `companion`: line-oriented REPL over the companion pipeline.
//!
//! Loads `companion.toml` (or the path given), wires one HTTP feed per
//! configured domain, and sends every non-command line to `handle`.

mod commands;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use companion_core::emotion::ToneHint;
use companion_core::{CompanionConfig, DomainId, Pipeline, PipelineBuilder};
use companion_feed::HttpFeedSource;

use crate::commands::{Command, HELP};

const DEFAULT_CONFIG: &str = "companion.toml";

#[derive(Parser)]
#[command(name = "companion")]
#[command(version)]
#[command(about = "Domain-aware knowledge companion REPL")]
struct Args {
    /// Config file (default: ./companion.toml if present)
    config: Option<PathBuf>,

    /// Starting domain
    #[arg(short, long, default_value = "nutrition")]
    domain: DomainId,

    /// Override the persistence backend ("sqlite" or "memory")
    #[arg(long)]
    backend: Option<String>,

    /// Print each reply as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.persistence.backend = backend;
    }
    init_tracing(&config);

    let pipeline = build_pipeline(config)?;
    info!(domain = %args.domain, "Companion ready");
    repl(&pipeline, args.domain, args.json).await
}

fn load_config(path: Option<&Path>) -> Result<CompanionConfig> {
    match path {
        Some(path) => CompanionConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            CompanionConfig::from_file(Path::new(DEFAULT_CONFIG)).context("failed to load ./companion.toml")
        }
        None => Ok(CompanionConfig::default()),
    }
}

fn init_tracing(config: &CompanionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("companion={0},companion_core={0},companion_feed={0}", config.general.log_level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_pipeline(config: CompanionConfig) -> Result<Pipeline> {
    let mut builder = PipelineBuilder::new(config.clone());
    for (domain, feed) in &config.feeds {
        match HttpFeedSource::for_domain(*domain, feed) {
            Ok(source) => builder = builder.source(*domain, Arc::new(source)),
            Err(e) => warn!(domain = %domain, error = %e, "Skipping feed"),
        }
    }
    builder.build().context("failed to wire the pipeline")
}

async fn repl(pipeline: &Pipeline, mut domain: DomainId, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(domain)?;

    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::Empty) => {}
            Ok(Command::Say(text)) => {
                let reply = pipeline.handle(&text, domain).await;
                if json {
                    println!("{}", serde_json::to_string(&reply)?);
                } else {
                    println!("[{} · {} · {}]", reply.topic, reply.decision, reply.emotion);
                    println!("{}", reply.reply);
                }
            }
            Ok(Command::Domain(next)) => {
                domain = next;
                println!("domain: {domain}");
            }
            Ok(Command::Domains) => {
                for d in DomainId::ALL {
                    let marker = if *d == domain { '*' } else { ' ' };
                    println!("{marker} {d}");
                }
            }
            Ok(Command::Mood) => {
                let state = pipeline.emotion().state();
                println!(
                    "level {}  joy {:.2}  sadness {:.2}  anger {:.2}  surprise {:.2}  trust {:.2}",
                    state.growth_level, state.joy, state.sadness, state.anger, state.surprise, state.trust
                );
                println!("tone: {}", ToneHint::from_state(&state));
            }
            Ok(Command::History(n)) => {
                for record in pipeline.log().recent(n) {
                    println!(
                        "{} {} {:<9} [{}] {}",
                        record.id,
                        record.timestamp.format("%H:%M:%S"),
                        record.speaker.tag(),
                        record.topic,
                        record.text.replace('\n', " / ")
                    );
                }
            }
            Ok(Command::Forget(id)) => match pipeline.log().remove(id) {
                Ok(()) => println!("forgot {id}"),
                Err(e) => println!("{e}"),
            },
            Ok(Command::Stats) => {
                print!("{}", pipeline.counters().snapshot().to_prometheus());
                let p = pipeline.latency().percentiles();
                println!(
                    "# handle latency ms: p50 {:.2}  p95 {:.2}  p99 {:.2}  max {:.2}",
                    p.p50, p.p95, p.p99, p.max
                );
                if !pipeline.log().is_healthy() {
                    println!("# conversation log is failing to persist");
                }
            }
            Ok(Command::Help) => println!("{HELP}"),
            Err(e) => println!("{e}"),
        }
        prompt(domain)?;
    }
    Ok(())
}

fn prompt(domain: DomainId) -> Result<()> {
    print!("{domain}> ");
    std::io::stdout().flush()?;
    Ok(())
}
