//! REST surface: session management and workspace file access
//!
//! Auxiliary to the WebSocket transport. Every file endpoint resolves the
//! requested path against the session workspace and rejects escapes with
//! 403.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use crate::gateway::connection::GatewayState;
use crate::session::ConversationContext;

pub fn routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/save", post(save_session))
        .route("/files/{session}/list", get(list_files))
        .route("/files/{session}/read", get(read_file))
        .route("/files/{session}/download", get(download_file))
        .route("/files/{session}/outputs", get(list_outputs))
}

async fn list_sessions(State(state): State<Arc<GatewayState>>) -> Response {
    Json(state.manager.list_sessions()).into_response()
}

async fn get_session(
    State(state): State<Arc<GatewayState>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    match state
        .manager
        .list_sessions()
        .into_iter()
        .find(|s| s.session_id == id)
    {
        Some(info) => Json(info).into_response(),
        None => not_found("session not found"),
    }
}

async fn delete_session(
    State(state): State<Arc<GatewayState>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    if state.manager.delete_session(&id) {
        Json(serde_json::json!({"deleted": id})).into_response()
    } else {
        not_found("session not found")
    }
}

async fn save_session(
    State(state): State<Arc<GatewayState>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let sessions_dir = state.manager.sessions_dir();
    match ConversationContext::load(sessions_dir, &id, false) {
        Ok(mut context) => match context.save() {
            Ok(()) => Json(serde_json::json!({"saved": id})).into_response(),
            Err(e) => {
                warn!("Snapshot save failed for {}: {}", id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": e.to_string()})),
                )
                    .into_response()
            }
        },
        Err(_) => not_found("session not found"),
    }
}

#[derive(Deserialize)]
struct FileQuery {
    path: String,
}

async fn list_files(
    State(state): State<Arc<GatewayState>>,
    UrlPath(session): UrlPath<String>,
) -> Response {
    let Some(workspace) = workspace_dir(&state, &session) else {
        return not_found("session not found");
    };

    let mut files = Vec::new();
    collect_files(&workspace, &workspace, &mut files);
    files.sort();
    Json(serde_json::json!({"session_id": session, "files": files})).into_response()
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().to_string());
        }
    }
}

async fn read_file(
    State(state): State<Arc<GatewayState>>,
    UrlPath(session): UrlPath<String>,
    Query(query): Query<FileQuery>,
) -> Response {
    let Some(workspace) = workspace_dir(&state, &session) else {
        return not_found("session not found");
    };
    let Some(path) = resolve_in(&workspace, &query.path) else {
        return forbidden();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => Json(serde_json::json!({
            "path": query.path,
            "content": content,
        }))
        .into_response(),
        Err(_) => not_found("file not found"),
    }
}

async fn download_file(
    State(state): State<Arc<GatewayState>>,
    UrlPath(session): UrlPath<String>,
    Query(query): Query<FileQuery>,
) -> Response {
    let Some(workspace) = workspace_dir(&state, &session) else {
        return not_found("session not found");
    };
    let Some(path) = resolve_in(&workspace, &query.path) else {
        return forbidden();
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "download".to_string());
            (
                [
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                    (
                        header::CONTENT_TYPE,
                        "application/octet-stream".to_string(),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => not_found("file not found"),
    }
}

async fn list_outputs(
    State(state): State<Arc<GatewayState>>,
    UrlPath(session): UrlPath<String>,
) -> Response {
    let sessions_dir = state.manager.sessions_dir();
    match ConversationContext::load(sessions_dir, &session, false) {
        Ok(context) => Json(serde_json::json!({
            "session_id": session,
            "outputs": context.outputs(),
        }))
        .into_response(),
        Err(_) => not_found("session not found"),
    }
}

fn workspace_dir(state: &GatewayState, session: &str) -> Option<PathBuf> {
    // Session names never contain separators; reject anything that would
    // leave the sessions root.
    if session.contains('/') || session.contains("..") || session.is_empty() {
        return None;
    }
    let dir = state.manager.sessions_dir().join(session).join("files");
    dir.is_dir().then_some(dir)
}

/// Resolve `path` under `base`, rejecting escapes.
fn resolve_in(base: &Path, path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized.starts_with(base).then_some(normalized)
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({"error": "path outside session workspace"})),
    )
        .into_response()
}
