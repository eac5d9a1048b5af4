//! Inboxsort Daemon
//!
//! Web service that signs users in with Google and classifies their unread
//! Gmail on demand.

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use inboxsort_core::classify::{EmailClassifier, OpenAiClient};
use inboxsort_core::config::{Config, GeneralConfig, Secrets};
use inboxsort_core::gmail::GmailClient;
use inboxsort_core::oauth::{GoogleOAuthConfig, OAuthManager};
use inboxsort_core::pipeline::InboxPipeline;
use inboxsort_core::session::{SessionCodec, SessionManager};

use server::AppState;

#[derive(Parser)]
#[command(name = "inboxsort-daemon")]
#[command(about = "Classifies unread Gmail with an LLM", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/inboxsort/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default if no command specified)
    Serve {
        /// Listen address, overriding server.bind_addr
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write the effective configuration to the config file
    WriteConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config.general)?;

    match cli.command {
        Some(Commands::Serve { bind }) => serve(config, bind).await,
        None => serve(config, None).await,
        Some(Commands::WriteConfig) => {
            config.save_to(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

/// Stdout logging, plus a daily-rotated file when `log_dir` is set
fn init_logging(general: &GeneralConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .context("Invalid log level")?;

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let file_layer = match &general.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "inboxsort.log");
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let secrets = Secrets::from_env().context("Missing credentials in environment")?;

    // One pool for Google, Gmail and the LLM; the timeout bounds every call
    let client = reqwest::Client::builder()
        .timeout(config.http.request_timeout())
        .build()?;

    let oauth = Arc::new(OAuthManager::new(
        GoogleOAuthConfig::from_config(&config, &secrets),
        client.clone(),
    ));
    let sessions = SessionManager::new(oauth.clone(), config.oauth.refresh_buffer_ms);
    let codec = SessionCodec::new(&secrets.session_secret, &config.server)?;

    let gmail = GmailClient::new(client.clone(), &config.gmail);
    let completions = OpenAiClient::new(client, &config.classifier, secrets.openai_api_key.clone());
    let classifier =
        EmailClassifier::new(Arc::new(completions), config.classifier.body_snippet_chars);
    let pipeline = InboxPipeline::new(Arc::new(gmail), classifier);

    let app = server::router(AppState {
        oauth,
        sessions,
        codec,
        pipeline,
    });

    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {:?}", bind_addr))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Inboxsort listening on {} (public URL {})", addr, config.server.public_url);
    info!(
        "Using model {} against {}",
        config.classifier.model, config.classifier.api_base
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
