//! Static asset delivery for the bundled single-page UI.
//!
//! Every path the API router does not claim is resolved against the
//! asset directory; anything unresolved gets the SPA shell so the
//! client-side router can take over.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};

use super::proto::Envelope;
use super::state::AppState;

const FALLBACK_SHELL: &str =
    "<!doctype html><html><head><title>netwarden</title></head><body>netwarden UI assets not installed</body></html>";

/// Map a request path to a file inside the asset root, refusing any
/// component that would escape it.
fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    if relative.is_empty() {
        return Some(root.join("index.html"));
    }
    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(candidate))
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Fallback handler: static file, SPA shell, or a 404 envelope for API
/// paths that matched no route.
pub async fn spa_fallback(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        return Envelope::failure(404, "unknown api path").into_response();
    }

    if let Some(path) = resolve_asset(&state.assets_dir, uri.path()) {
        if let Ok(bytes) = tokio::fs::read(&path).await {
            return ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response();
        }
    }

    // Unknown paths get the shell; the SPA router handles them.
    match tokio::fs::read(state.assets_dir.join("index.html")).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            FALLBACK_SHELL,
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_to_index() {
        let root = Path::new("/srv/web");
        assert_eq!(
            resolve_asset(root, "/").unwrap(),
            Path::new("/srv/web/index.html")
        );
    }

    #[test]
    fn nested_paths_stay_inside_root() {
        let root = Path::new("/srv/web");
        assert_eq!(
            resolve_asset(root, "/static/app.js").unwrap(),
            Path::new("/srv/web/static/app.js")
        );
    }

    #[test]
    fn traversal_components_are_refused() {
        let root = Path::new("/srv/web");
        assert!(resolve_asset(root, "/../etc/passwd").is_none());
        assert!(resolve_asset(root, "/static/../../etc/passwd").is_none());
    }

    #[test]
    fn content_types_cover_spa_assets() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("app.js")), "text/javascript");
        assert_eq!(content_type(Path::new("style.css")), "text/css");
        assert_eq!(content_type(Path::new("unknown.bin")), "application/octet-stream");
    }
}
