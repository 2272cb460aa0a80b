//! Mockingjay CLI

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use mockingjay_config::{load_config, Config};
use mockingjay_core::body_bytes;
use mockingjay_runtime::{Dispatcher, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mockingjay")]
#[command(about = "Scriptable HTTP mock server", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info", env = "MOCKINGJAY_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single request against a mock directory
    Invoke {
        /// Mock directory (overrides the config file)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Request path, optionally with a query string
        #[arg(short, long)]
        path: String,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Content type of the body
        #[arg(long, default_value = "application/json")]
        content_type: String,

        /// Extra request headers as `name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "mockingjay.yaml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Invoke {
            root,
            path,
            method,
            body,
            content_type,
            headers,
            config,
        } => {
            let mut settings = match config {
                Some(path) => load_config(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(root) = root {
                settings.server.root = root;
            }

            let server = ServerConfig::builder(settings)
                .build()
                .context("failed to initialise server")?;
            tracing::debug!(scripts = ?server.scripts(), "Mock directory scanned");

            let uri = if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            };
            let mut request = http::Request::builder().method(method.as_str()).uri(uri);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .with_context(|| format!("invalid header '{header}', expected 'name: value'"))?;
                request = request.header(name.trim(), value.trim());
            }
            if body.is_some() {
                request = request.header("content-type", content_type);
            }
            let request = request
                .body(body.map(Bytes::from).unwrap_or_default())
                .context("invalid request")?;

            let mut dispatcher = Dispatcher::new(Arc::new(server));
            let response = dispatcher.dispatch(request);

            let (parts, body) = response.into_parts();
            println!("{}", parts.status);
            for (name, value) in &parts.headers {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            let body = body_bytes(body);
            if !body.is_empty() {
                println!();
                println!("{}", String::from_utf8_lossy(&body));
            }
            Ok(())
        }

        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config.display());

            match load_config(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Root: {}", cfg.server.root.display());
                    tracing::info!("  API prefix: {}", cfg.server.api_prefix);
                    tracing::info!("  Non-reentrant scripts: {}", cfg.locking.non_reentrant.len());
                    tracing::info!("  Variables: {}", cfg.variables.len());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter.into());

    // logs go to stderr so invoke output stays clean
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
