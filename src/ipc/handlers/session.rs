use crate::ipc::helpers::{respond, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde_json::json;

pub(crate) fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "user": session.user,
        "role": session.role(),
        "roleLabel": session.role().label(),
        "capabilities": session.role().capabilities(),
        "openedAt": session.opened_at.to_rfc3339(),
    })
}

fn session_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = required_str(params, "email")?;
    let user = state
        .store
        .find_user_by_email(&email)?
        .filter(|u| u.active)
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "no active account for this email".to_string(),
            details: Some(json!({ "email": email })),
        })?;
    let session = Session::open(user);
    tracing::info!(user = %session.user.id, role = session.role().as_str(), "session opened");
    let out = session_json(&session);
    state.session = Some(session);
    Ok(out)
}

fn session_current(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(match state.session.as_ref() {
        Some(s) => session_json(s),
        None => json!({ "user": null }),
    })
}

fn session_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let closed = state.session.take();
    if let Some(s) = closed.as_ref() {
        tracing::info!(user = %s.user.id, "session closed");
    }
    Ok(json!({ "closed": closed.is_some() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.open" => session_open(state, &req.params),
        "session.current" => session_current(state),
        "session.close" => session_close(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
