use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use zipsa_gateway::api::router::build_router;
use zipsa_gateway::bootstrap::{build_app_state, load_config, spawn_session_sweeper};

#[derive(Parser)]
#[command(name = "zipsa", about = "Real-estate consultation orchestration runtime")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway server.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zipsa=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);

    match cli.command {
        Command::CheckConfig => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("configuration ok");
            }
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == zipsa_domain::config::ConfigSeverity::Error)
            {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Serve => {
            let state = build_app_state(config.clone()).await?;
            spawn_session_sweeper(state.clone());

            let router = build_router(state);
            let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
            tracing::info!(bind = %config.server.bind, "gateway listening");

            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("shutdown signal received");
                })
                .await?;
            Ok(())
        }
    }
}
