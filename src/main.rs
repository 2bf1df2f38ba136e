//! gamelink - Cross-device game login
//!
//! Lets a game client without a browser sign in by having an already
//! signed-in user approve it from their browser.

use anyhow::Result;
use clap::Parser;
use gamelink_auth::{PairingPolicy, PairingService, PairingStorage, StaticSessions, TokenCodec};
use gamelink_core::{Config, SessionSeed};
use gamelink_server::{create_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// gamelink - Pair game clients with signed-in browser sessions
#[derive(Parser, Debug)]
#[command(name = "gamelink")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long, env = "GAMELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "GAMELINK_LISTEN_ADDR")]
    listen: Option<String>,

    /// Externally reachable base URL used in pairing links
    #[arg(long, env = "GAMELINK_PUBLIC_URL")]
    public_url: Option<String>,

    /// Sign-in page users are sent to when they have no session
    #[arg(long, env = "GAMELINK_LOGIN_URL")]
    login_url: Option<String>,

    /// Path of the pairing storage file
    #[arg(long, env = "GAMELINK_STORAGE")]
    storage: Option<PathBuf>,

    /// Keep pairings in memory only
    #[arg(long, env = "GAMELINK_IN_MEMORY")]
    in_memory: bool,

    /// Pairing request lifetime in seconds
    #[arg(long, env = "GAMELINK_REQUEST_TTL")]
    request_ttl: Option<u64>,

    /// Approval lifetime in seconds
    #[arg(long, env = "GAMELINK_APPROVAL_TTL")]
    approval_ttl: Option<u64>,

    /// Seed a browser session as TOKEN:USER_ID:USERNAME (repeatable)
    #[arg(long = "session", value_parser = parse_session)]
    sessions: Vec<SessionSeed>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_session(s: &str) -> Result<SessionSeed, String> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(token), Some(user_id), Some(username))
            if !token.is_empty() && !user_id.is_empty() =>
        {
            Ok(SessionSeed {
                token: token.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
            })
        }
        _ => Err(format!("expected TOKEN:USER_ID:USERNAME, got {:?}", s)),
    }
}

/// Layer defaults, the config file and command line flags
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::new(),
    };

    if let Some(addr) = &args.listen {
        config = config.with_listen_addr(addr.clone());
    }
    if let Some(url) = &args.public_url {
        config = config.with_public_url(url.clone());
    }
    if let Some(url) = &args.login_url {
        config = config.with_login_url(url.clone());
    }
    if let Some(path) = &args.storage {
        config = config.with_storage_path(path.clone());
    }
    if args.in_memory {
        config = config.with_in_memory(true);
    }
    if let Some(secs) = args.request_ttl {
        config = config.with_request_ttl_secs(secs);
    }
    if let Some(secs) = args.approval_ttl {
        config = config.with_approval_ttl_secs(secs);
    }
    for seed in &args.sessions {
        config = config.with_session(seed.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn open_storage(config: &Config) -> Result<Arc<PairingStorage>> {
    if config.in_memory {
        warn!("Using in-memory storage: pairings are lost on exit");
        return Ok(Arc::new(PairingStorage::in_memory()));
    }

    let path = match &config.storage_path {
        Some(path) => path.clone(),
        None => PairingStorage::default_path()?,
    };
    let storage = PairingStorage::with_path(path.clone()).await?;
    let (requests, approvals, credentials) = storage.counts().await;
    info!(
        "Pairing storage: {:?} ({} requests, {} approvals, {} credentials)",
        path, requests, approvals, credentials
    );
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("gamelink v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;
    let storage = open_storage(&config).await?;
    let codec = TokenCodec::new(config.hash_cost)?;
    let service =
        PairingService::new(storage, codec).with_policy(PairingPolicy::from_config(&config));

    let sessions = StaticSessions::from_seeds(&config.sessions);
    if sessions.is_empty() {
        warn!("No browser sessions configured: nobody can approve pairings");
    } else {
        info!("Loaded {} browser session(s)", sessions.len());
    }

    let state = Arc::new(AppState::new(&config, service, Arc::new(sessions)));
    let router = create_router(state.clone());

    let addr = config.socket_addr()?;
    info!("Starting server on {}...", addr);
    info!("  Pairing links: {}/game?id=<request>", state.public_url);
    info!("  Sign-in page: {}", state.login_url);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session() {
        let seed = parse_session("cookie:u1:alice:smith").unwrap();
        assert_eq!(seed.token, "cookie");
        assert_eq!(seed.user_id, "u1");
        assert_eq!(seed.username, "alice:smith");

        assert!(parse_session("cookie:u1").is_err());
        assert!(parse_session(":u1:alice").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "gamelink",
            "--listen",
            "0.0.0.0:9000",
            "--in-memory",
            "--request-ttl",
            "60",
            "--session",
            "cookie:u1:alice",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert!(config.in_memory);
        assert_eq!(config.request_ttl_secs, 60);
        assert_eq!(config.sessions.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let args = Args::parse_from(["gamelink", "--request-ttl", "0"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["gamelink", "--approval-ttl", "9000000000000"]);
        assert!(build_config(&args).is_err());
    }
}
