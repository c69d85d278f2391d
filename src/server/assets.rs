//! QUnit runtime and stylesheet
//!
//! A project that installs `qunit` from npm gets its own copy served; otherwise the routes redirect to the pinned
//! CDN release. A session fails fast when the script cannot be loaded either way (see `browser::session`).

use std::path::Path;
use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};

pub const QUNIT_VERSION: &str = "2.19.1";
const CDN_BASE: &str = "https://code.jquery.com/qunit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Script,
    Stylesheet,
}

impl AssetKind {
    fn extension(self) -> &'static str {
        match self {
            AssetKind::Script => "js",
            AssetKind::Stylesheet => "css",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            AssetKind::Script => "text/javascript; charset=utf-8",
            AssetKind::Stylesheet => "text/css; charset=utf-8",
        }
    }

    /// Route the harness page loads this asset from.
    pub fn route(self) -> &'static str {
        match self {
            AssetKind::Script => "/qunit.js",
            AssetKind::Stylesheet => "/qunit.css",
        }
    }

    /// The pinned CDN URL for this asset.
    pub fn cdn_url(self) -> String {
        format!("{CDN_BASE}/qunit-{QUNIT_VERSION}.{}", self.extension())
    }
}

/// Framework assets shared by every request.
#[derive(Debug, Clone, Default)]
pub struct FrameworkAssets {
    script: Option<Arc<[u8]>>,
    stylesheet: Option<Arc<[u8]>>,
}

impl FrameworkAssets {
    /// Load `node_modules/qunit/qunit/qunit.{js,css}` under `root` when present.
    pub async fn load(root: &Path) -> Self {
        let dir = root.join("node_modules").join("qunit").join("qunit");
        let script: Option<Arc<[u8]>> = tokio::fs::read(dir.join("qunit.js")).await.ok().map(Arc::from);
        let stylesheet: Option<Arc<[u8]>> = tokio::fs::read(dir.join("qunit.css")).await.ok().map(Arc::from);
        if script.is_some() {
            tracing::debug!(dir = %dir.display(), "serving local QUnit");
        } else {
            tracing::warn!(
                version = QUNIT_VERSION,
                "qunit is not installed under node_modules, test pages will load it from the CDN"
            );
        }
        Self { script, stylesheet }
    }

    /// Respond with an asset, or redirect to the CDN when it is not available locally.
    pub fn respond(&self, kind: AssetKind) -> Response {
        let bytes = match kind {
            AssetKind::Script => &self.script,
            AssetKind::Stylesheet => &self.stylesheet,
        };
        match bytes {
            Some(bytes) => ([(header::CONTENT_TYPE, kind.content_type())], bytes.to_vec()).into_response(),
            None => Redirect::temporary(&kind.cdn_url()).into_response(),
        }
    }
}
