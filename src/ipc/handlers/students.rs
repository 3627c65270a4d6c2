use crate::filters::ListFilter;
use crate::ipc::handlers::setup::{check_school_keys, SchoolKeys};
use crate::ipc::helpers::{existing_student, optional_str, require, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::Capability;
use crate::store::{new_id, Student};
use serde_json::json;

fn check_class(state: &AppState, class_name: &str) -> Result<(), HandlerErr> {
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: Some(class_name),
            ..SchoolKeys::default()
        },
    )
}

fn students_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ViewRoster)?;
    let filter = ListFilter {
        class_name: optional_str(params, "className"),
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };
    let students = filter.apply(state.store.list_students()?);
    Ok(json!({ "students": students }))
}

fn students_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ManageRoster)?;
    let student = Student {
        id: new_id(),
        display_name: required_str(params, "displayName")?,
        class_name: required_str(params, "className")?,
    };
    check_class(state, &student.class_name)?;
    state.store.put_student(&student)?;
    tracing::info!(student = %student.id, class = %student.class_name, "student created");
    Ok(json!({ "student": student }))
}

fn students_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ManageRoster)?;
    let student_id = required_str(params, "studentId")?;
    let mut student = existing_student(state, &student_id)?;
    if let Some(name) = optional_str(params, "displayName") {
        student.display_name = name;
    }
    if let Some(class_name) = optional_str(params, "className") {
        check_class(state, &class_name)?;
        student.class_name = class_name;
    }
    state.store.put_student(&student)?;
    tracing::info!(student = %student.id, "student updated");
    Ok(json!({ "student": student }))
}

fn students_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require(state, Capability::ManageRoster)?;
    let student_id = required_str(params, "studentId")?;
    if !state.store.delete_student(&student_id)? {
        return Err(HandlerErr::not_found("student", &student_id));
    }
    if let Some(s) = state
        .session
        .as_mut()
        .filter(|s| s.user.student_id.as_deref() == Some(student_id.as_str()))
    {
        s.user.student_id = None;
    }
    tracing::info!(student = %student_id, "student deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
