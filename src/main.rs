//! Notebridge Server
//!
//! A webhook-driven notification bridge that provides:
//!
//! 1. **Notification routing**: The external mirror service POSTs pings
//!    to `/notify`; the bridge builds a client scoped to the notified
//!    user's stored credential and handles `locations` pings (position
//!    card write-back) and `timeline` pings (note ingestion on reply).
//!
//! 2. **Contributor operations**: `/contributor` dispatches named
//!    operations — subscriptions, timeline inserts (optionally with
//!    re-uploaded image media), contacts, display-name changes, and a
//!    quota-guarded broadcast that fans one card out to every registered
//!    user through a single batched call.
//!
//! 3. **Note listings**: public notes and per-contributor notes, newest
//!    first, as JSON.

mod actions;
mod broadcast;
mod credentials;
mod error;
mod mailbox;
mod mirror;
mod notes;
mod notify;
mod protocol;
mod state;

use std::time::Duration;

use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{AppState, BridgeConfig};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "notebridge", version, about = "Webhook-driven notification bridge")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "BRIDGE_PORT")]
    port: u16,

    /// Base URL of the external mirror service
    #[arg(long, default_value = "http://localhost:9000", env = "MIRROR_BASE_URL")]
    mirror_base_url: String,

    /// This bridge's own public base URL (used for subscription callbacks
    /// and resolving relative media URLs)
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Maximum number of users a broadcast may target
    #[arg(long, default_value_t = state::DEFAULT_BROADCAST_QUOTA, env = "BROADCAST_QUOTA")]
    broadcast_quota: usize,

    /// Flash message TTL in seconds
    #[arg(long, default_value_t = state::DEFAULT_FLASH_TTL_SECS, env = "FLASH_TTL_SECS")]
    flash_ttl_secs: i64,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = state::DEFAULT_CLEANUP_INTERVAL_SECS, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Directory for persisting credentials and notes
    #[arg(long, env = "BRIDGE_DATA_DIR")]
    data_dir: Option<String>,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notebridge=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let public_base_url = args
        .public_base_url
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));

    let config = BridgeConfig {
        port: args.port,
        mirror_base_url: args.mirror_base_url,
        public_base_url,
        broadcast_quota: args.broadcast_quota,
        flash_ttl_secs: args.flash_ttl_secs,
        cleanup_interval_secs: args.cleanup_interval_secs,
        data_dir: args.data_dir,
    };

    let state = AppState::new(config);
    state.load_from_disk();

    // Spawn periodic cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = cleanup_state.config.cleanup_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval));
        loop {
            interval.tick().await;
            cleanup_state.cleanup_expired();
        }
    });

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/notify", post(notify::handle_notify))
        .route("/notes", get(actions::list_public_notes))
        .route("/credentials", post(actions::upsert_credential))
        .route(
            "/contributor",
            get(actions::contributor_page).post(actions::handle_contributor_post),
        )
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.port);
    tracing::info!(
        mirror = state.config.mirror_base_url.as_str(),
        quota = state.config.broadcast_quota,
        "Notebridge server starting on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "notebridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "registered_users": state.credentials.user_count(),
        "notes": state.notes.note_count(),
        "public_notes": state.notes.public_notes().len(),
        "pending_flash_messages": state.mailbox.len(),
        "broadcast_quota": state.config.broadcast_quota,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_json_structure() {
        let json_val = json!({
            "status": "ok",
            "service": "notebridge",
            "version": env!("CARGO_PKG_VERSION"),
        });
        assert_eq!(json_val["status"], "ok");
        assert_eq!(json_val["service"], "notebridge");
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.broadcast_quota, 10);
        assert_eq!(config.flash_ttl_secs, 5);
        assert!(config.data_dir.is_none());
    }

    #[tokio::test]
    async fn test_state_creation() {
        let state = AppState::new(BridgeConfig::default());
        assert_eq!(state.credentials.user_count(), 0);
        assert_eq!(state.notes.note_count(), 0);
    }
}
