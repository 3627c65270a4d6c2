use serde_json::Value;

use super::error::unknown_method;
use super::handlers;
use super::types::{AppState, Request};

type Handler = fn(&mut AppState, &Request) -> Option<Value>;

/// Method families in dispatch order; the first handler claiming a method answers it.
const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::session::try_handle,
    handlers::users::try_handle,
    handlers::students::try_handle,
    handlers::grades::try_handle,
    handlers::attendance::try_handle,
    handlers::chapters::try_handle,
    handlers::schedule::try_handle,
    handlers::courses::try_handle,
    handlers::materials::try_handle,
    handlers::reports::try_handle,
    handlers::setup::try_handle,
    handlers::backup_exchange::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for handler in HANDLERS {
        if let Some(resp) = (*handler)(state, &req) {
            return resp;
        }
    }
    tracing::debug!(method = %req.method, "no handler for method");
    unknown_method(&req.id, &req.method)
}
