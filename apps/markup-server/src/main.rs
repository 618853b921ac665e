//! Markup Server
//!
//! Persists markups drawn in the browser editor into the stored PDF they
//! were drawn over. Provides REST API endpoints for:
//!
//! - Saving markups (compositing into page content, pruning replaced
//!   annotations)
//! - Listing existing annotations and their removable identifiers
//!
//! ## Architecture
//!
//! Documents live under a single directory given on the command line. Each
//! save loads the source bytes, runs the compositor on a blocking worker and
//! streams the new PDF back, optionally writing it beside the source.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod storage;

use api::{handle_health, handle_list_annotations, handle_save_markups};
use storage::DocumentStore;

/// Command-line arguments for the markup server
#[derive(Parser, Debug)]
#[command(name = "markup-server")]
#[command(about = "Burns canvas markups into stored PDF documents")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory holding the PDF documents
    #[arg(long, default_value = "./documents")]
    documents_dir: PathBuf,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "10")]
    rate_limit: u32,

    /// Maximum request body size in megabytes
    #[arg(long, default_value = "25")]
    max_body_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
}

/// Routes and per-request middleware, without rate limiting.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/markups/save", post(handle_save_markups))
        .route("/api/annotations/*name", get(handle_list_annotations))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting markup server on {}:{}", args.host, args.port);

    if !args.documents_dir.is_dir() {
        anyhow::bail!(
            "Documents directory {} does not exist",
            args.documents_dir.display()
        );
    }

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to create rate limiter config"))?,
    );

    let state = AppState {
        store: Arc::new(DocumentStore::new(&args.documents_dir)),
    };

    let app = build_router(state, args.max_body_mb * 1024 * 1024).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Documents directory: {}", args.documents_dir.display());
    info!("Rate limit: {} requests/second per IP", args.rate_limit);

    // The governor keys on the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
