use crate::filters::ListFilter;
use crate::ipc::helpers::{
    optional_bool, optional_str, require, required_str, respond, string_list, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{Capability, Role, User};
use crate::store::new_id;
use serde_json::json;

fn parse_role(raw: &str) -> Result<Role, HandlerErr> {
    Role::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("role must be one of: admin, professor, student"))
}

fn ensure_email_free(state: &AppState, email: &str, except_id: Option<&str>) -> Result<(), HandlerErr> {
    if !email.contains('@') {
        return Err(HandlerErr::bad_params("email must contain @"));
    }
    if let Some(existing) = state.store.find_user_by_email(email)? {
        if Some(existing.id.as_str()) != except_id {
            return Err(HandlerErr {
                code: "bad_params",
                message: "email already in use".to_string(),
                details: Some(json!({ "email": email })),
            });
        }
    }
    Ok(())
}

fn ensure_student_link(state: &AppState, user: &User) -> Result<(), HandlerErr> {
    match (&user.student_id, user.role) {
        (Some(sid), Role::Student) => {
            if state.store.get_student(sid)?.is_none() {
                return Err(HandlerErr::not_found("student", sid));
            }
            Ok(())
        }
        (Some(_), _) => Err(HandlerErr::bad_params(
            "only student accounts can link a roster student",
        )),
        (None, _) => Ok(()),
    }
}

fn users_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ManageUsers)?;
    let role = optional_str(params, "role").map(|r| parse_role(&r)).transpose()?;
    let filter = ListFilter {
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };
    let users: Vec<User> = filter
        .apply(state.store.list_users()?)
        .into_iter()
        .filter(|u| role.map_or(true, |r| u.role == r))
        .collect();
    Ok(json!({ "users": users }))
}

fn users_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ManageUsers)?;
    let email = required_str(params, "email")?;
    ensure_email_free(state, &email, None)?;
    let user = User {
        id: new_id(),
        name: required_str(params, "name")?,
        email,
        role: parse_role(&required_str(params, "role")?)?,
        active: optional_bool(params, "active")?.unwrap_or(true),
        student_id: optional_str(params, "studentId"),
        classes: string_list(params, "classes")?.unwrap_or_default(),
        subjects: string_list(params, "subjects")?.unwrap_or_default(),
    };
    ensure_student_link(state, &user)?;
    state.store.put_user(&user)?;
    tracing::info!(user = %user.id, role = user.role.as_str(), "user created");
    Ok(json!({ "user": user }))
}

fn users_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = require(state, Capability::ManageUsers)?;
    let user_id = required_str(params, "userId")?;
    let mut user = state
        .store
        .get_user(&user_id)?
        .ok_or_else(|| HandlerErr::not_found("user", &user_id))?;

    if let Some(name) = optional_str(params, "name") {
        user.name = name;
    }
    if let Some(email) = optional_str(params, "email") {
        ensure_email_free(state, &email, Some(&user.id))?;
        user.email = email;
    }
    if let Some(role) = optional_str(params, "role") {
        user.role = parse_role(&role)?;
    }
    if let Some(active) = optional_bool(params, "active")? {
        user.active = active;
    }
    if params.get("studentId").is_some() {
        user.student_id = optional_str(params, "studentId");
    }
    if let Some(classes) = string_list(params, "classes")? {
        user.classes = classes;
    }
    if let Some(subjects) = string_list(params, "subjects")? {
        user.subjects = subjects;
    }
    if user.role != Role::Student {
        user.student_id = None;
    }
    if user.id == session.user.id && (user.role != Role::Admin || !user.active) {
        return Err(HandlerErr::bad_params(
            "an admin cannot demote or deactivate their own account",
        ));
    }
    ensure_student_link(state, &user)?;

    state.store.put_user(&user)?;
    if let Some(s) = state.session.as_mut().filter(|s| s.user.id == user.id) {
        s.user = user.clone();
    }
    tracing::info!(user = %user.id, "user updated");
    Ok(json!({ "user": user }))
}

fn users_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = require(state, Capability::ManageUsers)?;
    let user_id = required_str(params, "userId")?;
    if user_id == session.user.id {
        return Err(HandlerErr::bad_params("an admin cannot delete their own account"));
    }
    if !state.store.delete_user(&user_id)? {
        return Err(HandlerErr::not_found("user", &user_id));
    }
    tracing::info!(user = %user_id, "user deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => users_list(state, &req.params),
        "users.create" => users_create(state, &req.params),
        "users.update" => users_update(state, &req.params),
        "users.delete" => users_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
