//! birdcard-se - Selection Engine service
//!
//! **Module Identity:**
//! - Name: birdcard-se (Selection Engine)
//! - Port: 5740
//!
//! Receives play events from card devices, picks the day's bird for the
//! observer's area exactly once, publishes it to the shared card, and serves
//! the track sequence for it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use birdcard_common::config::EngineConfig;
use birdcard_common::events::EventBus;
use birdcard_common::SystemClock;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use birdcard_se::clients::{http, EBirdClient, HttpDeviceRegistry, HttpPublisher, IpApiClient};
use birdcard_se::services::{background, Collaborators, SelectionEngine};
use birdcard_se::types::DeviceRegistry;
use birdcard_se::{build_router, AppState};

/// Command-line arguments for birdcard-se
#[derive(Parser, Debug)]
#[command(name = "birdcard-se")]
#[command(about = "Location-aware selection engine for BirdCard")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "BIRDCARD_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address, overrides [server] bind
    #[arg(short, long, env = "BIRDCARD_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, config_path) = EngineConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("birdcard_se={0},birdcard_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting BirdCard Selection Engine (birdcard-se) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    let collaborators = build_collaborators(&config)?;
    let events = EventBus::new(256);
    let engine = Arc::new(SelectionEngine::new(
        &config,
        collaborators,
        Arc::new(SystemClock),
        events,
    ));

    let sweep = Duration::from_secs(config.session.sweep_interval_secs);
    background::spawn_session_sweeper(engine.clone(), sweep);
    background::spawn_record_sweeper(engine.clone(), sweep);
    if config.scheduler.global_refresh_enabled {
        background::spawn_global_refresh(
            engine.clone(),
            config.target.default_target_id.clone(),
            Duration::from_secs(config.scheduler.interval_secs),
        );
    }

    let state = AppState::new(engine, config.target.default_target_id.clone());
    let app = build_router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_collaborators(config: &EngineConfig) -> Result<Collaborators> {
    let c = &config.collaborators;
    let client = http::build_client(c)?;

    let publish_url = c
        .publish_url
        .as_deref()
        .context("collaborators.publish_url must be set")?;

    let device_registry = c.device_registry_url.as_deref().map(|url| {
        info!("Device registry: {}", url);
        Arc::new(HttpDeviceRegistry::new(
            client.clone(),
            url,
            c.device_registry_token.clone(),
            c.requests_per_second,
        )) as Arc<dyn DeviceRegistry>
    });
    if device_registry.is_none() {
        info!("No device registry configured, device timezone tier disabled");
    }

    let ebird = Arc::new(EBirdClient::new(
        client.clone(),
        &c.observations_url,
        c.observations_token.clone(),
        c.requests_per_second,
    ));

    Ok(Collaborators {
        ip_geo: Arc::new(IpApiClient::new(client.clone(), &c.ip_geo_url, c.requests_per_second)),
        device_registry,
        timezone_lookup: None,
        selection_source: ebird.clone(),
        publisher: Arc::new(HttpPublisher::new(
            client,
            publish_url,
            c.publish_token.clone(),
            c.requests_per_second,
        )),
        occurrences: ebird,
    })
}
