mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tracing::{info, warn};
use voice_bridge::api::{build_cors_layer, create_router, AppState};
use voice_bridge::config::BridgeConfig;
use voice_bridge::credentials::{generate_key, CredentialStore, TokenCipher};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_bridge=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Some(Commands::GenerateKey) = cli.command {
        println!("{}", generate_key());
        return Ok(());
    }

    let config = BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::GenerateKey => Ok(()),
        Commands::CheckConfig => check_config(&config),
        Commands::ListDevices => list_devices(&config),
        Commands::RemoveDevice { device_id } => remove_device(&config, &device_id),
        Commands::Purge { days } => purge(&config, days),
    }
}

async fn serve(config: BridgeConfig, bind: Option<String>) -> Result<()> {
    info!("Voice Bridge starting...");

    let missing = config.missing_required();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Required configuration missing; affected operations will fail");
    }

    let state = AppState::from_config(&config).context("Failed to initialize application state")?;
    let cors = build_cors_layer(&config.server).context("Invalid CORS configuration")?;
    let router = create_router(state).layer(cors);

    let bind_address = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    info!(
        bind_address = %bind_address,
        database_path = %config.storage.database_path,
        redirect_uri = %config.spotify.redirect_uri,
        "Voice Bridge listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Voice Bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn check_config(config: &BridgeConfig) -> Result<()> {
    let missing = config.missing_required();
    for name in [
        "SPOTIFY_CLIENT_ID",
        "SPOTIFY_CLIENT_SECRET",
        "SPOTIFY_SCOPE",
        "FIELD_ENCRYPTION_KEY",
    ] {
        let status = if missing.contains(&name) { "missing" } else { "set" };
        println!("{:<24} {}", name, status);
    }
    println!("{:<24} {}", "SPOTIFY_REDIRECT_URI", config.spotify.redirect_uri);
    println!("{:<24} {}", "DATABASE_PATH", config.storage.database_path);
    println!("{:<24} {}", "AUTH_STATE_TTL", config.auth.state_ttl_seconds);
    let transcription = if config.transcription.api_key.is_some() {
        "set"
    } else {
        "missing (audio commands disabled)"
    };
    println!("{:<24} {}", "OPENAI_API_KEY", transcription);

    if let Some(key) = config.auth.encryption_key.as_deref() {
        if let Err(e) = TokenCipher::new(key) {
            bail!("FIELD_ENCRYPTION_KEY is invalid: {}", e);
        }
    }

    config.validate().context("Configuration incomplete")?;
    println!("Configuration OK");
    Ok(())
}

fn open_store(config: &BridgeConfig) -> Result<CredentialStore> {
    let cipher = TokenCipher::from_config(config.auth.encryption_key.as_deref())
        .context("FIELD_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;
    CredentialStore::new(&config.storage.database_path, Arc::new(cipher))
        .context("Failed to open credential store")
}

fn list_devices(config: &BridgeConfig) -> Result<()> {
    let store = open_store(config)?;
    let devices = store.list_all().context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No authenticated devices");
        return Ok(());
    }

    for device in devices {
        println!(
            "{}\tupdated {}\t{}",
            device.device_id,
            device.updated_at.to_rfc3339(),
            if device.is_expired() { "expired" } else { "valid" }
        );
    }
    Ok(())
}

fn remove_device(config: &BridgeConfig, device_id: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.delete(device_id).context("Failed to remove device")? {
        info!(device_id = %device_id, "Removed device credentials");
        println!("Removed {}", device_id);
    } else {
        println!("No credentials stored for {}", device_id);
    }
    Ok(())
}

fn purge(config: &BridgeConfig, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(config.storage.retention_days);
    let store = open_store(config)?;
    let deleted = store
        .purge_stale(days)
        .context("Failed to purge stale credentials")?;

    info!(deleted, days, "Purged stale credentials");
    println!("Deleted {} credential(s) older than {} days", deleted, days);
    Ok(())
}
