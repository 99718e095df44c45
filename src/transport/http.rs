//! # HTTP peer transport
//!
//! Connects groups on different nodes over plain HTTP.
//!
//! ## Wire Protocol
//!
//! ```text
//!   GET <base_path><group>/<key>
//!
//!   base_path   defaults to "/_peercache/"
//!   group, key  percent-encoded path segments; the key may contain '/'
//!
//!   200  application/octet-stream   value bytes
//!   400  text                        path does not split into group and key
//!   404  text                        "no such group: <group>"
//!   500  text                        error returned by Group::get
//! ```
//!
//! ## Pieces
//!
//! | Type          | Side   | Role                                              |
//! |---------------|--------|---------------------------------------------------|
//! | [`HttpPool`]  | client | [`PeerPicker`] over a ring of peer base URLs      |
//! | [`HttpFetcher`] | client | [`PeerFetcher`] for one peer                    |
//! | [`router`]    | server | axum router answering the protocol from a registry |
//!
//! ## Threading
//!
//! [`Group::get`](crate::group::Group::get) blocks, so the server runs it on
//! tokio's blocking pool. [`HttpFetcher`] uses the blocking reqwest client,
//! which therefore only ever runs on those blocking threads or on plain OS
//! threads. Build pools and fetchers outside of any async context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::ds::hash_ring::{default_hash, HashFn};
use crate::error::{ConfigError, PeerError};
use crate::group::GroupRegistry;
use crate::peers::RingPeerPicker;
use crate::traits::{PeerFetcher, PeerPicker};

/// Default URL prefix of the peer protocol.
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Default number of virtual nodes per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// Default per-request timeout of [`HttpFetcher`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings shared by the client and server halves of a pool.
#[derive(Clone)]
pub struct HttpPoolOptions {
    base_path: String,
    replicas: usize,
    hash_fn: HashFn,
    timeout: Duration,
}

impl HttpPoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL prefix. Must start and end with `/`.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn hash_fn(mut self, hash_fn: HashFn) -> Self {
        self.hash_fn = hash_fn;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get_base_path(&self) -> &str {
        &self.base_path
    }

    pub fn get_replicas(&self) -> usize {
        self.replicas
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_base_path(&self.base_path)?;
        if self.timeout.is_zero() {
            return Err(ConfigError::new("timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            hash_fn: default_hash,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for HttpPoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPoolOptions")
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn validate_base_path(base_path: &str) -> Result<(), ConfigError> {
    if base_path.len() < 2 || !base_path.starts_with('/') || !base_path.ends_with('/') {
        return Err(ConfigError::new(format!(
            "base path must start and end with '/': {base_path:?}"
        )));
    }
    Ok(())
}

fn validate_peer_url(peer: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(peer)
        .map_err(|err| ConfigError::new(format!("invalid peer url {peer:?}: {err}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::new(format!(
            "invalid peer url {peer:?}: expected http or https"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// [`PeerFetcher`] that issues `GET <peer><base_path><group>/<key>`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for the peer at `peer` (e.g. `http://10.0.0.2:8001`).
    pub fn new(peer: &str, options: &HttpPoolOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let client = build_client(options.timeout)?;
        Self::with_client(client, peer, &options.base_path)
    }

    fn with_client(client: Client, peer: &str, base_path: &str) -> Result<Self, ConfigError> {
        validate_peer_url(peer)?;
        Ok(Self {
            client,
            base_url: format!("{}{}", peer.trim_end_matches('/'), base_path),
        })
    }

    /// Returns the URL prefix requests are issued under.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, group: &str, key: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        )
    }
}

impl PeerFetcher for HttpFetcher {
    fn fetch(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
        let url = self.url_for(group, key);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| PeerError::new(format!("GET {url} failed: {err}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(PeerError::with_status(status.as_u16(), body.trim_end()));
        }

        let body = response
            .bytes()
            .map_err(|err| PeerError::new(format!("reading response body: {err}")))?;
        Ok(body.to_vec())
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn build_client(timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ConfigError::new(format!("failed to create HTTP client: {err}")))
}

/// Peer picker for a node reachable at `self_url`.
///
/// Peers are identified by their base URL. The pool owns one HTTP client
/// shared by all of its fetchers.
pub struct HttpPool {
    self_url: String,
    options: HttpPoolOptions,
    client: Client,
    picker: RingPeerPicker,
}

impl HttpPool {
    pub fn new(self_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_options(self_url, HttpPoolOptions::default())
    }

    pub fn with_options(
        self_url: impl Into<String>,
        options: HttpPoolOptions,
    ) -> Result<Self, ConfigError> {
        let self_url = self_url.into();
        validate_peer_url(&self_url)?;
        options.validate()?;

        let client = build_client(options.timeout)?;
        let picker =
            RingPeerPicker::with_hasher(self_url.clone(), options.replicas, options.hash_fn);
        Ok(Self {
            self_url,
            options,
            client,
            picker,
        })
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    pub fn options(&self) -> &HttpPoolOptions {
        &self.options
    }

    /// Replaces the peer set. Each entry is a base URL such as
    /// `http://10.0.0.2:8001`; this node's own URL is normally included.
    pub fn set<I, S>(&self, peers: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.picker.set_peers(peers, |peer| {
            let fetcher =
                HttpFetcher::with_client(self.client.clone(), peer, &self.options.base_path)?;
            Ok(Arc::new(fetcher) as Arc<dyn PeerFetcher>)
        })
    }

    /// Returns the peer base URL that owns `key`.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.picker.owner(key)
    }

    pub fn peers(&self) -> Vec<String> {
        self.picker.peers()
    }

    /// Builds the server half of this pool, serving groups from `registry`
    /// under the pool's base path.
    pub fn router(&self, registry: Arc<GroupRegistry>) -> Result<Router, ConfigError> {
        router(registry, &self.options.base_path)
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        let peer = self.picker.pick_peer(key)?;
        debug!(node = %self.self_url, key, "picked remote peer");
        Some(peer)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("options", &self.options)
            .field("peers", &self.picker.peers())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct ServerState {
    registry: Arc<GroupRegistry>,
    base_path: Arc<str>,
}

/// Returns an axum router that answers `GET <base_path><group>/<key>` from
/// the groups in `registry`.
pub fn router(registry: Arc<GroupRegistry>, base_path: &str) -> Result<Router, ConfigError> {
    validate_base_path(base_path)?;
    let state = ServerState {
        registry,
        base_path: Arc::from(base_path),
    };
    Ok(Router::new()
        .route(base_path, get(bad_request))
        .route(&format!("{base_path}{{*rest}}"), get(serve_peer_request))
        .with_state(state))
}

async fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "bad request").into_response()
}

async fn serve_peer_request(State(state): State<ServerState>, uri: Uri) -> Response {
    let Some((group_name, key)) = uri
        .path()
        .strip_prefix(&*state.base_path)
        .and_then(split_request)
    else {
        return bad_request().await;
    };

    let Some(group) = state.registry.get_group(&group_name) else {
        return (StatusCode::NOT_FOUND, format!("no such group: {group_name}")).into_response();
    };

    group.record_server_request();
    debug!(group = %group_name, key = %key, "serving peer request");

    let result = tokio::task::spawn_blocking(move || group.get(&key)).await;
    match result {
        Ok(Ok(view)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            view.as_bytes(),
        )
            .into_response(),
        Ok(Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        Err(err) => {
            warn!(group = %group_name, error = %err, "lookup task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "lookup task failed").into_response()
        },
    }
}

/// Splits `<group>/<key>` at the first `/` and percent-decodes both halves.
fn split_request(rest: &str) -> Option<(String, String)> {
    let (group, key) = rest.split_once('/')?;
    let group = urlencoding::decode(group).ok()?.into_owned();
    let key = urlencoding::decode(key).ok()?.into_owned();
    Some((group, key))
}
