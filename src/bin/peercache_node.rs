//! Demo cache node.
//!
//! Starts one peer of a small cluster serving a `scores` group backed by an
//! in-memory table, and optionally a front-end API that reads through it.
//!
//! ```text
//! peercache-node --port 8001 &
//! peercache-node --port 8002 &
//! peercache-node --port 8003 --api &
//! curl "http://localhost:9999/api?key=Tom"
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use peercache::error::LoadError;
use peercache::group::{loader_fn, Group, GroupRegistry};
use peercache::transport::http::HttpPool;

#[derive(Debug, Parser)]
#[command(name = "peercache-node", about = "Run one node of a peercache cluster")]
struct Args {
    /// Port the peer protocol listens on.
    #[arg(long, default_value_t = 8001)]
    port: u16,

    /// Also start the front-end API server.
    #[arg(long)]
    api: bool,

    /// Address of the front-end API server.
    #[arg(long, default_value = "http://localhost:9999")]
    api_addr: String,

    /// Base URLs of every cluster member, including this node.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "http://localhost:8001,http://localhost:8002,http://localhost:8003"
    )]
    peers: Vec<String>,

    /// Local cache capacity in bytes for the demo group.
    #[arg(long, default_value_t = 2 << 10)]
    cache_bytes: usize,
}

fn scores_db() -> HashMap<&'static str, &'static str> {
    HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
}

fn create_scores_group(registry: &GroupRegistry, cache_bytes: usize) -> Result<Arc<Group>> {
    let db = scores_db();
    let group = registry.new_group(
        "scores",
        cache_bytes,
        loader_fn(move |key| {
            info!(key, "[slow db] search key");
            db.get(key)
                .map(|value| value.as_bytes().to_vec())
                .ok_or_else(|| LoadError::new(format!("{key} not exist")))
        }),
    )?;
    Ok(group)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let registry = Arc::new(GroupRegistry::new());
    let group = create_scores_group(&registry, args.cache_bytes)?;

    // The blocking HTTP client must be built outside the runtime.
    let self_url = format!("http://localhost:{}", args.port);
    let pool = Arc::new(HttpPool::new(self_url.clone())?);
    pool.set(args.peers.iter().cloned())?;
    group.register_peers(pool.clone())?;

    let cache_router = pool.router(Arc::clone(&registry))?;
    let api_bind = if args.api {
        Some(api_bind_addr(&args.api_addr)?)
    } else {
        None
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let cache_server = async {
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
                .await
                .with_context(|| format!("failed to bind port {}", args.port))?;
            info!(url = %self_url, "cache server running");
            axum::serve(listener, cache_router)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("cache server failed")
        };

        let api_server = async {
            let Some(addr) = api_bind else {
                return Ok(());
            };
            let listener = tokio::net::TcpListener::bind(addr.as_str())
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(addr = %args.api_addr, "api server running");
            axum::serve(listener, api_router(group))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("api server failed")
        };

        tokio::try_join!(cache_server, api_server).map(|_| ())
    })?;

    info!("node stopped");
    Ok(())
}

fn api_bind_addr(api_addr: &str) -> Result<String> {
    let url =
        reqwest::Url::parse(api_addr).with_context(|| format!("invalid api addr {api_addr}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("api addr {api_addr} has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("api addr {api_addr} has no port"))?;
    Ok(format!("{host}:{port}"))
}

fn api_router(group: Arc<Group>) -> Router {
    Router::new().route("/api", get(api_get)).with_state(group)
}

async fn api_get(
    State(group): State<Arc<Group>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = params.get("key").cloned().unwrap_or_default();
    match tokio::task::spawn_blocking(move || group.get(&key)).await {
        Ok(Ok(view)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            view.as_bytes(),
        )
            .into_response(),
        Ok(Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler: run until killed.
        std::future::pending::<()>().await;
    }
}
