//! Web server for the side-by-side viewer
//!
//! Serves the embedded viewer page, the brat client files of the current
//! corpus, and a small JSON API driving the application state. Requests are
//! handled one at a time on the server thread, which owns the state.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Component, Path};
use tiny_http::{Header, Method, Response, Server};
use url::form_urlencoded;

use crate::error::VizError;
use crate::filter;
use crate::payload::Side;
use crate::state::AppState;

const VIEWER_HTML: &str = include_str!("viewer.html");
const BRAT_LOCATION_PLACEHOLDER: &str = "__BRAT_LOCATION__";

/// Static settings of the viewer page
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    /// Brat client directory, relative to the corpus root
    pub brat_location: String,
}

/// A response before it is bound to a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::error(500, &format!("Failed to encode response: {}", e)),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: json!({ "error": message }).to_string().into_bytes(),
        }
    }

    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
        }
    }
}

impl From<VizError> for ApiResponse {
    fn from(err: VizError) -> Self {
        let status = match err {
            VizError::InvalidClusterIndex { .. }
            | VizError::UnknownCorpus(_)
            | VizError::UnknownDocument(_) => 400,
            VizError::MalformedPayload(_)
            | VizError::MissingSurfaceForm(_)
            | VizError::NoCorpus
            | VizError::Load { .. }
            | VizError::Parse { .. } => 500,
        };
        log::warn!("Request failed: {}", err);
        ApiResponse::error(status, &err.to_string())
    }
}

/// Route one GET request against the state
pub fn handle_request(state: &mut AppState, settings: &ViewerSettings, url: &str) -> ApiResponse {
    let path = url.split('?').next().unwrap_or(url);
    let params = parse_query_params(url);

    let result = match path {
        "/" | "/index.html" => Ok(ApiResponse::html(
            VIEWER_HTML.replace(BRAT_LOCATION_PLACEHOLDER, &settings.brat_location),
        )),
        "/api/corpora" => {
            let corpora: Vec<_> = state
                .corpora()
                .iter()
                .map(|c| json!({ "name": c.name, "label": c.display_label() }))
                .collect();
            Ok(ApiResponse::json(&json!({
                "corpora": corpora,
                "current": state.current_corpus().name,
            })))
        }
        "/api/documents" => Ok(ApiResponse::json(&json!({
            "documents": state.documents(),
            "current": state.current_document(),
        }))),
        "/api/annotation-config" => state
            .current_corpus()
            .store
            .annotation_config()
            .map(|config| ApiResponse::json(&config)),
        "/api/select" => select(state, &params),
        "/api/show-clusters" => match params.get("enabled").map(|v| parse_flag(v)) {
            Some(Some(enabled)) => {
                state.set_show_clusters(enabled);
                view(state)
            }
            _ => return ApiResponse::error(400, "expected enabled=true|false"),
        },
        "/api/selection" => {
            let side = match params.get("side").map(|s| s.parse::<Side>()) {
                Some(Ok(side)) => side,
                Some(Err(e)) => return ApiResponse::error(400, &e),
                None => return ApiResponse::error(400, "missing side parameter"),
            };
            let clusters = params.get("clusters").map(String::as_str).unwrap_or("");
            let selection = match filter::parse_selection(clusters) {
                Ok(selection) => selection,
                Err(e) => {
                    return ApiResponse::error(400, &format!("invalid cluster list '{}': {}", clusters, e))
                }
            };
            state
                .set_selection(side, selection)
                .and_then(|()| view(state))
        }
        "/api/clusters" => cluster_labels(state),
        "/api/view" => view(state),
        p if p.starts_with("/static/") => return serve_static(state.current_corpus().store.root(), &p[8..]),
        _ => return ApiResponse::error(404, "Not found"),
    };

    result.unwrap_or_else(ApiResponse::from)
}

/// Switch corpus and/or document and load; applied only if every step succeeds
fn select(state: &mut AppState, params: &HashMap<String, String>) -> crate::error::Result<ApiResponse> {
    let mut next = state.clone();
    if let Some(corpus) = params.get("corpus") {
        next.select_corpus(corpus)?;
    }
    if let Some(doc) = params.get("doc") {
        next.select_document(doc)?;
    }
    next.refresh()?;
    *state = next;
    view(state)
}

fn view(state: &AppState) -> crate::error::Result<ApiResponse> {
    Ok(match state.view()? {
        Some(view) => ApiResponse::json(&json!({
            "view": view,
            "selection": {
                "gold": state.selection(Side::Gold),
                "system": state.selection(Side::System),
            },
        })),
        None => ApiResponse::error(404, "No document loaded"),
    })
}

fn cluster_labels(state: &AppState) -> crate::error::Result<ApiResponse> {
    Ok(ApiResponse::json(&json!({
        "gold": state.cluster_labels(Side::Gold)?,
        "system": state.cluster_labels(Side::System)?,
    })))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Serve a file below `root`; paths leaving the root are refused
fn serve_static(root: &Path, relative: &str) -> ApiResponse {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return ApiResponse::error(403, "Forbidden");
    }

    let path = root.join(relative);
    match std::fs::read(&path) {
        Ok(body) => ApiResponse {
            status: 200,
            content_type: content_type(&path),
            body,
        },
        Err(e) => {
            log::debug!("Static file {} unavailable: {}", path.display(), e);
            ApiResponse::error(404, "Not found")
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("ttf") => "font/ttf",
        Some("woff") => "font/woff",
        _ => "application/octet-stream",
    }
}

/// Parse query parameters from URL path
fn parse_query_params(path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some((_, query)) = path.split_once('?') {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
    }
    params
}

/// Start the viewer server; blocks until the process is interrupted
pub fn start_server(mut state: AppState, settings: ViewerSettings, port: u16, open_browser: bool) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let server = Server::http(&addr).map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    if let Err(e) = state.refresh() {
        log::warn!("Initial document load failed: {}", e);
    }

    let url = format!("http://localhost:{}", port);
    log::info!("Please use the following URL for visualization: {}", url);
    log::info!("Press Ctrl+C to stop");

    if open_browser {
        if let Err(e) = webbrowser::open(&url) {
            log::warn!("Could not open browser: {}. Please open {} manually.", e, url);
        }
    }

    for request in server.incoming_requests() {
        let response = if *request.method() == Method::Get {
            handle_request(&mut state, &settings, request.url())
        } else {
            ApiResponse::error(405, "Only GET is supported")
        };
        log::debug!("{} {} -> {}", request.method(), request.url(), response.status);

        let mut http = Response::from_data(response.body).with_status_code(response.status);
        if let Ok(header) = Header::from_bytes("Content-Type", response.content_type) {
            http = http.with_header(header);
        }
        if let Err(e) = request.respond(http) {
            log::error!("Failed to send response: {}", e);
        }
    }

    Ok(())
}
