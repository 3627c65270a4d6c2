//! Response envelopes written back on stdout, one JSON object per line.

use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut envelope = json!({
        "id": id,
        "ok": false,
        "error": { "code": code, "message": message.into() },
    });
    if let Some(d) = details {
        envelope["error"]["details"] = d;
    }
    envelope
}

/// Reply to an input line that did not parse as a request; it carries no id.
pub fn bad_line(message: impl Into<String>) -> Value {
    json!({
        "ok": false,
        "error": { "code": "bad_json", "message": message.into() },
    })
}

pub fn unknown_method(id: &str, method: &str) -> Value {
    err(
        id,
        "not_implemented",
        format!("unknown method: {}", method),
        Some(json!({ "method": method })),
    )
}
