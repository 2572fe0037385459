//! Tessera Gateway - S3 API Gateway
//!
//! This binary serves the S3 bucket, listing, ACL and multipart API over
//! the configured metadata store.

mod auth_middleware;
mod metrics_middleware;
mod s3;

use anyhow::{Context, Result};
use auth_middleware::{AuthState, auth_layer};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use clap::{Parser, ValueEnum};
use s3::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_auth::UserStore;
use tessera_common::Config;
use tessera_common::config::StoreBackend;
use tessera_meta_store::{MemoryStore, MetadataStore, RedbStore};
use tessera_s3::{S3Service, s3_metrics};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = s3_metrics().export_prometheus();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "tessera-gateway")]
#[command(about = "Tessera S3 API Gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the S3 API (overrides the config file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Disable authentication; every request runs as the first configured user
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn MetadataStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Metadata store: memory (volatile)");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redb => {
            info!("Metadata store: redb at {}", config.store.path.display());
            if let Some(parent) = config.store.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let store = RedbStore::open(&config.store.path)
                .with_context(|| format!("opening {}", config.store.path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Tessera Gateway");

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    let store = open_store(&config)?;
    let users = Arc::new(UserStore::from_config(&config.users).context("seeding users")?);
    info!("Loaded {} seed user(s)", config.users.len());

    let mut auth_state = AuthState::new(users.clone());
    if args.no_auth {
        let first = config
            .users
            .first()
            .context("--no-auth requires at least one configured user")?;
        info!(
            "Authentication is DISABLED (development mode), acting as {}",
            first.display_name
        );
        auth_state = auth_state.with_fixed_identity(first.canonical_id.clone());
    } else {
        info!("Identity is taken from the Authorization header (anonymous when absent)");
    }

    let state = Arc::new(AppState {
        service: S3Service::new(store, users, config.server.namespace.clone(), &config.s3),
    });

    let body_limit = DefaultBodyLimit::max(config.server.max_body_size);
    info!("Max request body size: {} bytes", config.server.max_body_size);
    info!("Metrics endpoint: /metrics (no auth)");

    let app = Router::new()
        // Metrics and health routes FIRST (must come before wildcards)
        .route("/metrics", get(metrics_handler))
        .route("/health", get(s3::health_check))
        // PUT /{bucket}         - create bucket
        // PUT /{bucket}?acl     - put bucket ACL
        // GET /{bucket}         - list objects
        // GET /{bucket}?acl     - get bucket ACL
        // GET /{bucket}?uploads - list multipart uploads
        .route("/{bucket}", get(s3::get_bucket).put(s3::put_bucket))
        .route("/{bucket}/", get(s3::get_bucket).put(s3::put_bucket))
        // PUT    /{bucket}/{key}                         - put object
        // PUT    /{bucket}/{key}?acl                     - put object ACL
        // PUT    /{bucket}/{key}?partNumber=N&uploadId=X - upload part
        // GET    /{bucket}/{key}?acl                     - get object ACL
        // GET    /{bucket}/{key}?uploadId=X              - list parts
        // HEAD   /{bucket}/{key}                         - object metadata
        // POST   /{bucket}/{key}?uploads                 - initiate multipart upload
        // POST   /{bucket}/{key}?uploadId=X              - complete multipart upload
        // DELETE /{bucket}/{key}?uploadId=X              - abort multipart upload
        .route(
            "/{bucket}/{*key}",
            get(s3::get_object)
                .put(s3::put_object)
                .head(s3::head_object)
                .post(s3::post_object)
                .delete(s3::delete_object),
        )
        .layer(body_limit)
        .layer(middleware::from_fn_with_state(Arc::new(auth_state), auth_layer))
        .layer(middleware::from_fn(metrics_middleware::metrics_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.server.listen;
    info!("Starting S3 API server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Gateway shut down gracefully");

    Ok(())
}
