//! Switchboard - LLM Query Router
//!
//! Command-line surface for the routing engine. Loads configuration, builds
//! the provider registry once, and relays engine events to stdout. Logs go to
//! stderr so stdout carries only wire messages.
//!
//! # Usage
//!
//! ```bash
//! # Route a query and stream events as NDJSON
//! switchboard query "Write a haiku about rust"
//!
//! # Prefer a provider, frame as server-sent events
//! switchboard query --provider anthropic --format sse "Explain borrowing"
//!
//! # Custom rule source
//! switchboard --rules ./routing_rules.toml query "debug this function"
//!
//! # Shorter answers
//! switchboard query --max-tokens 256 "Summarize the borrow checker"
//!
//! # Introspection
//! switchboard providers
//! switchboard health
//! switchboard check-config
//!
//! # Verbose logging
//! RUST_LOG=debug switchboard query "hello"
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: Stops consuming the active query, which cancels the provider
//!   request

mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use switchboard_core::config::{
    default_config_path, load_settings_from_path, ConfigOverrides, Settings,
};
use switchboard_core::{ProviderReport, RouteError, Router, RoutingRuleSet, StreamEvent};
use tracing::{info, warn};

use output::WireFormat;

/// Switchboard - route queries across hosted LLM providers with fallback
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "SWITCHBOARD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Routing rule source (JSON, or TOML by extension)
    #[arg(short = 'r', long, global = true, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Ask providers for whole responses instead of streams
    #[arg(long, global = true)]
    no_stream: bool,

    /// Response token limit sent to providers
    #[arg(long, global = true, value_name = "TOKENS")]
    max_tokens: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route a query and stream its events
    Query {
        /// Query text
        text: String,

        /// Preferred provider (openai, anthropic, google)
        #[arg(short = 'p', long)]
        provider: Option<String>,

        /// Event framing on stdout
        #[arg(short = 'f', long, value_enum, default_value_t = WireFormat::Ndjson)]
        format: WireFormat,
    },

    /// Show available providers, usage stats and the rule set
    Providers,

    /// Probe every provider
    Health,

    /// Report configuration problems
    CheckConfig,
}

/// Initialize logging to stderr
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("switchboard={level},switchboard_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

/// Load settings and apply command-line overrides
fn load(args: &Args) -> Result<Settings> {
    let path = args.config.clone().or_else(default_config_path);
    let mut settings = load_settings_from_path(path.clone())
        .with_context(|| format!("Failed to load configuration from {path:?}"))?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref rules) = args.rules {
        overrides = overrides.with_rules_file(rules.clone());
    }
    if args.no_stream {
        overrides = overrides.with_streaming(false);
    }
    overrides.apply(&mut settings);

    info!(
        source = %settings.source(),
        rules = ?settings.rules_file,
        providers = ?settings.configured_providers(),
        "Configuration loaded"
    );
    Ok(settings)
}

/// Stream one query to stdout
///
/// Returns whether the request completed.
async fn run_query(
    router: &Router,
    text: &str,
    provider: Option<&str>,
    format: WireFormat,
) -> Result<bool> {
    let mut events = match router.query(text, provider) {
        Ok(events) => events,
        Err(RouteError::InvalidInput) => {
            anyhow::bail!("400 Bad Request: {}", RouteError::InvalidInput)
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = io::stdout();
    let mut completed = false;
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                completed = matches!(event, StreamEvent::Complete { .. });
                output::write_event(&mut stdout, &event, format)
                    .context("Failed to write event")?;
            }
            _ = &mut ctrl_c => {
                warn!("Interrupted, cancelling request");
                break;
            }
        }
    }

    // Dropping the stream releases the in-flight provider request
    drop(events);
    Ok(completed)
}

#[derive(Serialize)]
struct ProvidersView<'a> {
    available: Vec<String>,
    stats: Vec<ProviderReport>,
    rules: &'a RoutingRuleSet,
}

#[derive(Serialize)]
struct ConfigReport {
    source: String,
    config_file: Option<PathBuf>,
    rules_file: PathBuf,
    configured_providers: Vec<&'static str>,
    warnings: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let settings = load(&args)?;

    if let Command::CheckConfig = args.command {
        let warnings = settings.validate();
        for warning in &warnings {
            warn!("{warning}");
        }
        let report = ConfigReport {
            source: settings.source().to_string(),
            config_file: settings.config_file_path.clone(),
            rules_file: settings.rules_file.clone(),
            configured_providers: settings.configured_providers(),
            warnings,
        };
        output::write_json(&mut io::stdout().lock(), &report)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut router = Router::from_settings(&settings);
    if let Some(max_tokens) = args.max_tokens {
        router = router.with_max_tokens(max_tokens);
    }

    match args.command {
        Command::Query {
            text,
            provider,
            format,
        } => {
            let completed = run_query(&router, &text, provider.as_deref(), format).await?;
            Ok(if completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Providers => {
            let view = ProvidersView {
                available: router.available_providers(),
                stats: router.list_provider_stats(),
                rules: router.current_rule_set(),
            };
            output::write_json(&mut io::stdout().lock(), &view)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let health = router.health_check_all().await;
            output::write_json(&mut io::stdout().lock(), &health)?;
            Ok(if health.values().any(|healthy| *healthy) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::CheckConfig => Ok(ExitCode::SUCCESS),
    }
}
