//! Harness page server
//!
//! An axum router on a loopback port that serves, for every test path:
//! - `GET /test/{path}?binding=NAME`: the harness page (see [`page::render`])
//! - `GET /bundle/{path}`: the bundled test module, or HTTP 500 with a JSON array of build messages
//! - `GET /qunit.js`, `GET /qunit.css`: the framework runtime and styles
//!
//! The server runs on its own task for the whole process lifetime and stops with the shutdown signal.

pub mod assets;
pub mod page;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::bundle::BuildMessage;
use crate::cli::test_interfaces::Bundler;
use crate::shutdown::Shutdown;
use assets::{AssetKind, FrameworkAssets};

/// State shared by all handlers.
#[derive(Clone)]
pub struct HarnessState {
    bundler: Arc<dyn Bundler>,
    assets: FrameworkAssets,
}

impl HarnessState {
    pub fn new(bundler: Arc<dyn Bundler>, assets: FrameworkAssets) -> Self {
        Self { bundler, assets }
    }
}

/// Build the harness router.
pub fn router(state: HarnessState) -> Router {
    Router::new()
        .route("/test/{*path}", get(test_page))
        .route("/bundle/{*path}", get(bundle))
        .route(AssetKind::Script.route(), get(qunit_js))
        .route(AssetKind::Stylesheet.route(), get(qunit_css))
        .with_state(state)
}

/// A running harness server.
pub struct HarnessServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl HarnessServer {
    /// Bind `127.0.0.1:<port>` (ephemeral when `port` is `None`) and start serving.
    pub async fn start(state: HarnessState, port: Option<u16>, shutdown: Shutdown) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port.unwrap_or(0))).await?;
        let addr = listener.local_addr()?;
        let app = router(state);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("harness server stopped: {e}");
            }
        });
        tracing::debug!(%addr, "harness server listening");
        Ok(Self { addr, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URLs of this server's routes.
    pub fn urls(&self) -> HarnessUrls {
        HarnessUrls::new(format!("http://{}", self.addr))
    }
}

/// Absolute URLs of the harness routes, as the browser requests them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessUrls {
    origin: String,
}

impl HarnessUrls {
    /// `origin` is scheme, host and port, without a trailing slash.
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into() }
    }

    /// Harness page for a test, reporting through `binding`.
    pub fn test_page(&self, test_path: &str, binding: &str) -> String {
        format!("{}{}?binding={binding}", self.origin, page::test_page_path(test_path))
    }

    /// Bundle for a test, as the harness page requests it.
    pub fn bundle(&self, test_path: &str) -> String {
        format!("{}{}", self.origin, page::bundle_path(test_path))
    }

    pub fn asset(&self, kind: AssetKind) -> String {
        format!("{}{}", self.origin, kind.route())
    }
}

impl Drop for HarnessServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    binding: Option<String>,
}

async fn test_page(Path(path): Path<String>, Query(query): Query<PageQuery>) -> Response {
    tracing::debug!(path = %path, "harness page requested");
    if let Some(binding) = &query.binding {
        if !qutest_core::is_valid_binding_name(binding) {
            return (StatusCode::BAD_REQUEST, format!("invalid binding name '{binding}'")).into_response();
        }
    }
    Html(page::render(&path, query.binding.as_deref())).into_response()
}

async fn bundle(State(state): State<HarnessState>, Path(path): Path<String>) -> Response {
    let Some(entry) = contained_path(&path) else {
        return (StatusCode::BAD_REQUEST, format!("test path '{path}' escapes the root")).into_response();
    };

    tracing::debug!(path = %path, "bundle requested");
    let bundler = Arc::clone(&state.bundler);
    let built = tokio::task::spawn_blocking(move || bundler.bundle(&entry)).await;
    match built {
        Ok(Ok(bytes)) => ([(header::CONTENT_TYPE, "application/javascript")], bytes).into_response(),
        Ok(Err(err)) => {
            tracing::warn!(path = %path, "bundling failed: {err}");
            build_error_response(&err.messages())
        }
        Err(join) => build_error_response(&[BuildMessage::text(format!("bundler task failed: {join}"))]),
    }
}

async fn qunit_js(State(state): State<HarnessState>) -> Response {
    state.assets.respond(AssetKind::Script)
}

async fn qunit_css(State(state): State<HarnessState>) -> Response {
    state.assets.respond(AssetKind::Stylesheet)
}

fn build_error_response(messages: &[BuildMessage]) -> Response {
    match serde_json::to_string_pretty(messages) {
        Ok(body) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Accept only relative paths that stay inside the root.
fn contained_path(raw: &str) -> Option<PathBuf> {
    let path = FsPath::new(raw);
    if raw.is_empty() {
        return None;
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path.to_path_buf())
}
