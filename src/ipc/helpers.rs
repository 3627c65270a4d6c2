use chrono::NaiveDate;
use serde_json::Value;

use crate::filters::ListFilter;
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::session::{Capability, Role, Session, StudentAccess, User};
use crate::store::{StoreError, Student};
use crate::timeline::TransitionError;

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self {
            code: "not_found",
            message: format!("{} not found", what),
            details: Some(serde_json::json!({ "id": id })),
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        tracing::warn!(error = %e, "store operation failed");
        Self::new("db_query_failed", e.to_string())
    }
}

impl From<TransitionError> for HandlerErr {
    fn from(e: TransitionError) -> Self {
        Self::new("invalid_transition", e.to_string())
    }
}

pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn required_bool(params: &Value, key: &str) -> Result<bool, HandlerErr> {
    optional_bool(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn string_list(params: &Value, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let Some(s) = item.as_str() else {
            return Err(HandlerErr::bad_params(format!("{} must contain strings", key)));
        };
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|o: &String| o == s) {
            out.push(s.to_string());
        }
    }
    Ok(Some(out))
}

/// A string field that can be left out, cleared with null or "", or set.
pub fn nullable_str(params: &Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.trim().to_string()))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

/// The optional `filters` object of list calls.
pub fn list_filter(params: &Value) -> Result<ListFilter, HandlerErr> {
    match params.get("filters") {
        None | Some(Value::Null) => Ok(ListFilter::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e))),
    }
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

pub fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    optional_str(params, key)
        .map(|s| parse_date(&s, key))
        .transpose()
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(&required_str(params, key)?, key)
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// The open session, or `no_session`.
pub fn current_session(state: &AppState) -> Result<Session, HandlerErr> {
    state
        .session
        .clone()
        .ok_or_else(|| HandlerErr::new("no_session", "open a session first"))
}

/// The open session if its role grants `cap`.
pub fn require(state: &AppState, cap: Capability) -> Result<Session, HandlerErr> {
    let session = current_session(state)?;
    if !session.can(cap) {
        return Err(HandlerErr {
            code: "forbidden",
            message: format!("{} may not do this", session.role().label()),
            details: Some(serde_json::json!({ "capability": cap })),
        });
    }
    Ok(session)
}

/// Loads a roster student the session may read records for.
pub fn readable_student(state: &AppState, student_id: &str) -> Result<Student, HandlerErr> {
    let session = current_session(state)?;
    if session.student_access(student_id) == StudentAccess::Denied {
        return Err(HandlerErr::new(
            "forbidden",
            "records of other students are not visible to this account",
        ));
    }
    state
        .store
        .get_student(student_id)?
        .ok_or_else(|| HandlerErr::not_found("student", student_id))
}

pub fn existing_student(state: &AppState, student_id: &str) -> Result<Student, HandlerErr> {
    state
        .store
        .get_student(student_id)?
        .ok_or_else(|| HandlerErr::not_found("student", student_id))
}

/// Class of the roster entry a student account is linked to. `None` for
/// other roles and for unlinked student accounts.
pub fn own_class(state: &AppState, session: &Session) -> Result<Option<String>, HandlerErr> {
    if session.role() != Role::Student {
        return Ok(None);
    }
    Ok(match session.user.student_id.as_deref() {
        Some(sid) => state.store.get_student(sid)?.map(|s| s.class_name),
        None => None,
    })
}

/// Loads a user who can be put in charge of teaching.
pub fn existing_professor(state: &AppState, user_id: &str) -> Result<User, HandlerErr> {
    let user = state
        .store
        .get_user(user_id)?
        .ok_or_else(|| HandlerErr::not_found("user", user_id))?;
    if user.role != Role::Professor || !user.active {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} is not an active professor", user.name),
            details: Some(serde_json::json!({ "userId": user_id })),
        });
    }
    Ok(user)
}
