use crate::backup;
use crate::ipc::helpers::{optional_str, require, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{Capability, Session};
use serde_json::{json, Value};
use std::path::PathBuf;

fn backup_failed(e: anyhow::Error, path: &str) -> HandlerErr {
    tracing::warn!(%path, error = %e, "backup failed");
    HandlerErr {
        code: "backup_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": path })),
    }
}

/// Reopens the workspace that was active before a failed import and hands
/// the session back to it.
fn restore_previous(state: &mut AppState, previous: Option<PathBuf>, session: Option<Session>) {
    match previous {
        Some(prev) => match state.open_workspace(&prev) {
            Ok(_) => state.session = session,
            Err(e) => tracing::warn!(error = %e, "could not reopen previous workspace"),
        },
        None => state.session = session,
    }
}

fn export_workspace_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageBackups)?;
    let out_path = required_str(params, "outPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| backup_failed(e, &out_path))?;
    tracing::info!(path = %out_path, "workspace bundle exported");
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn import_workspace_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageBackups)?;
    let in_path = required_str(params, "inPath")?;
    let Some(workspace_path) = optional_str(params, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
    else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr {
            code: "not_found",
            message: "bundle file not found".to_string(),
            details: Some(json!({ "path": in_path })),
        });
    }

    let staged =
        backup::stage_import(&src, &workspace_path).map_err(|e| backup_failed(e, &in_path))?;
    tracing::debug!(format = staged.format(), "import staged");

    // The open connection must go before its database file is replaced.
    let session = state.session.take();
    let previous = state.workspace.clone();
    if previous.is_some() {
        if let Err(e) = state.release_workspace() {
            restore_previous(state, previous, session);
            return Err(backup_failed(e, &in_path));
        }
    }

    let import = match staged.commit() {
        Ok(v) => v,
        Err(e) => {
            restore_previous(state, previous, session);
            return Err(backup_failed(e, &in_path));
        }
    };

    if let Err(e) = state.open_workspace(&workspace_path) {
        restore_previous(state, previous, session);
        return Err(HandlerErr {
            code: "db_open_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "path": workspace_path.to_string_lossy() })),
        });
    }
    tracing::info!(
        path = %in_path,
        workspace = %workspace_path.display(),
        "workspace bundle imported"
    );
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_workspace_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_workspace_bundle(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
