use anyhow::{Context, Result};
use clap::Parser;
use rp_demo_server::{AppState, Config, HtmlRenderer, router};
use rp_oidc::{FlowOrchestrator, InMemoryCorrelationStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Demo relying party for an OpenID Connect identity provider
#[derive(Parser)]
#[command(name = "rp-demo-server")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let store = Arc::new(InMemoryCorrelationStore::new());
    let flow = FlowOrchestrator::new(config.oidc.clone(), store)
        .context("Failed to set up the OIDC flow")?;

    // Keys are fetched lazily too; this only keeps them warm
    if config.oidc.key_set_ttl_seconds > 0 {
        flow.key_cache()
            .spawn_periodic_refresh(config.oidc.key_set_ttl());
    }

    let cleanup_flow = flow.clone();
    let cleanup_interval = Duration::from_secs(config.server.cleanup_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = cleanup_flow.cleanup_expired().await {
                warn!("Failed to purge expired login attempts: {}", e);
            }
        }
    });

    let state = AppState {
        flow,
        renderer: Arc::new(HtmlRenderer::new(config.server.app_name.clone())),
        app_name: config.server.app_name.clone(),
        default_autologin_subject: config.autologin.default_subject.clone(),
    };
    let app = router(state, &config.server.static_dir);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("{} listening on http://{}", config.server.app_name, addr);
    info!("IdP callback expected at {}", config.oidc.redirect_uri);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
