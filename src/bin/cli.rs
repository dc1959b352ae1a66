use anyhow::{Context, Result};
use art_explorer as lib;
use clap::{Parser, Subcommand};
use lib::config::Config;
use std::path::{Path, PathBuf};
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "art-explorer", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web app (long-running)
    Serve,
    /// Validate config file and exit
    ConfigValidate,
    /// Resolve and print the instance's oauth endpoints
    Discover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Resolve config path: explicit --config overrides; otherwise prefer
    // system-wide /etc/art-explorer/config.toml, fall back to the
    // repository example config, and finally to built-in defaults.
    let resolved_config_path: Option<PathBuf> = match &cli.config {
        Some(p) => Some(p.clone()),
        None => {
            let etc_path = Path::new("/etc/art-explorer/config.toml");
            let example_path = Path::new("config/example-config.toml");
            if etc_path.exists() {
                Some(etc_path.to_path_buf())
            } else if example_path.exists() {
                Some(example_path.to_path_buf())
            } else {
                None
            }
        }
    };

    let cfg = match &resolved_config_path {
        Some(p) => Config::from_path(p)
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => Config::default(),
    };

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "art-explorer.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");

    match cli.command {
        Commands::Serve => {
            lib::server::serve(cfg)
                .await
                .with_context(|| "running server".to_string())?;
        }
        Commands::ConfigValidate => match resolved_config_path {
            Some(p) => match Config::from_path(&p) {
                Ok(_) => println!("OK"),
                Err(e) => {
                    eprintln!("Config validation failed: {}", e);
                    std::process::exit(2);
                }
            },
            None => {
                eprintln!("No config file found (looked for --config, /etc/art-explorer/config.toml, config/example-config.toml)");
                std::process::exit(2);
            }
        },
        Commands::Discover => {
            let client = lib::util::http_client(&cfg)?;
            let base = lib::util::instance_base(&cfg);
            let well_known = lib::oauth::endpoint::well_known_url(&base);
            match lib::oauth::endpoint::discover(&client, &well_known).await {
                Ok(pair) => {
                    println!("authorization_endpoint: {}", pair.authorization_endpoint);
                    println!("token_endpoint:         {}", pair.token_endpoint);
                }
                Err(e) => {
                    eprintln!("Discovery failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
