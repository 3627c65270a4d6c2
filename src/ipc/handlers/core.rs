use crate::ipc::helpers::{respond, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "store": state.store.kind(),
        "sessionOpen": state.session.is_some(),
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    let created = state.open_workspace(&path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "workspace open failed");
        HandlerErr {
            code: "db_open_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "path": path.to_string_lossy() })),
        }
    })?;
    tracing::info!(path = %path.display(), "workspace selected");
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "bootstrapAdmin": created.map(|u| u.email),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state),
        "workspace.select" => handle_workspace_select(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
