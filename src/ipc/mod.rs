//! JSON-lines request/response protocol between the desktop shell and the daemon.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::bad_line;
pub use router::handle_request;
pub use types::{AppState, Request};
