use std::collections::HashMap;

use crate::filters::ListFilter;
use crate::ipc::handlers::setup::{check_school_keys, SchoolKeys};
use crate::ipc::helpers::{
    existing_professor, nullable_str, optional_str, own_class, require, required_str, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{find_conflict, weekly_load, Day, ScheduleEntry, TimeSlot};
use crate::session::{Capability, Role};
use crate::store::new_id;
use serde_json::{json, Value};

fn parse_day(raw: &str) -> Result<Day, HandlerErr> {
    Day::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params("day must be one of: monday, tuesday, wednesday, thursday, friday")
    })
}

fn parse_slot(raw: &str) -> Result<TimeSlot, HandlerErr> {
    TimeSlot::parse(raw).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

pub(crate) fn teacher_names(state: &AppState) -> Result<HashMap<String, String>, HandlerErr> {
    Ok(state
        .store
        .list_users()?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect())
}

pub(crate) fn entry_row(entry: &ScheduleEntry, names: &HashMap<String, String>) -> Value {
    let mut row = json!(entry);
    row["dayLabel"] = json!(entry.day.label());
    row["teacherName"] = json!(entry.teacher_id.as_ref().and_then(|id| names.get(id)));
    row
}

fn days() -> Value {
    Day::ALL
        .iter()
        .map(|d| json!({ "day": d, "label": d.label() }))
        .collect()
}

fn check_free(state: &AppState, entry: &ScheduleEntry) -> Result<(), HandlerErr> {
    match find_conflict(entry, &state.store.list_schedule()?) {
        None => Ok(()),
        Some(conflict) => Err(HandlerErr {
            code: "schedule_conflict",
            message: conflict.to_string(),
            details: Some(json!({
                "kind": conflict.kind(),
                "entryId": conflict.entry_id(),
            })),
        }),
    }
}

fn schedule_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ViewSchedule)?;
    let mut filter = ListFilter {
        class_name: optional_str(params, "className"),
        subject: optional_str(params, "subject"),
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };
    if session.role() == Role::Student {
        match own_class(state, &session)? {
            Some(class_name) => filter.class_name = Some(class_name),
            None => return Ok(json!({ "entries": [], "days": days() })),
        }
    }
    let day = optional_str(params, "day")
        .map(|d| parse_day(&d))
        .transpose()?;
    let teacher_id = optional_str(params, "teacherId");

    let names = teacher_names(state)?;
    let rows: Vec<Value> = filter
        .apply(state.store.list_schedule()?)
        .iter()
        .filter(|e| day.map_or(true, |d| e.day == d))
        .filter(|e| teacher_id.is_none() || e.teacher_id == teacher_id)
        .map(|e| entry_row(e, &names))
        .collect();
    Ok(json!({ "entries": rows, "days": days() }))
}

/// A professor's own sessions, or a student's class timetable.
fn schedule_mine(state: &mut AppState) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ViewSchedule)?;
    let all = state.store.list_schedule()?;
    let entries: Vec<ScheduleEntry> = if session.role() == Role::Student {
        match own_class(state, &session)? {
            Some(class_name) => all.into_iter().filter(|e| e.class_name == class_name).collect(),
            None => Vec::new(),
        }
    } else {
        all.into_iter()
            .filter(|e| e.teacher_id.as_deref() == Some(session.user.id.as_str()))
            .collect()
    };

    let names = teacher_names(state)?;
    let rows: Vec<Value> = entries.iter().map(|e| entry_row(e, &names)).collect();
    Ok(json!({
        "entries": rows,
        "load": weekly_load(&entries),
        "days": days(),
    }))
}

fn schedule_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageSchedule)?;
    let entry = ScheduleEntry {
        id: new_id(),
        day: parse_day(&required_str(params, "day")?)?,
        slot: parse_slot(&required_str(params, "slot")?)?,
        class_name: required_str(params, "className")?,
        subject: required_str(params, "subject")?,
        teacher_id: nullable_str(params, "teacherId")?.flatten(),
        room: optional_str(params, "room").unwrap_or_default(),
    };
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: Some(entry.class_name.as_str()),
            subject: Some(entry.subject.as_str()),
            term: None,
        },
    )?;
    if let Some(teacher_id) = entry.teacher_id.as_deref() {
        existing_professor(state, teacher_id)?;
    }
    check_free(state, &entry)?;

    state.store.put_schedule_entry(&entry)?;
    tracing::info!(
        entry = %entry.id,
        day = entry.day.as_str(),
        slot = %entry.slot,
        class = %entry.class_name,
        "schedule entry created"
    );
    let names = teacher_names(state)?;
    Ok(json!({ "entry": entry_row(&entry, &names) }))
}

fn schedule_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageSchedule)?;
    let entry_id = required_str(params, "entryId")?;
    let mut entry = state
        .store
        .get_schedule_entry(&entry_id)?
        .ok_or_else(|| HandlerErr::not_found("schedule entry", &entry_id))?;

    if let Some(day) = optional_str(params, "day") {
        entry.day = parse_day(&day)?;
    }
    if let Some(slot) = optional_str(params, "slot") {
        entry.slot = parse_slot(&slot)?;
    }
    let class_name = optional_str(params, "className");
    let subject = optional_str(params, "subject");
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: class_name.as_deref(),
            subject: subject.as_deref(),
            term: None,
        },
    )?;
    if let Some(class_name) = class_name {
        entry.class_name = class_name;
    }
    if let Some(subject) = subject {
        entry.subject = subject;
    }
    if let Some(teacher_id) = nullable_str(params, "teacherId")? {
        if let Some(id) = teacher_id.as_deref() {
            existing_professor(state, id)?;
        }
        entry.teacher_id = teacher_id;
    }
    if let Some(v) = params.get("room") {
        entry.room = v.as_str().map(str::trim).unwrap_or_default().to_string();
    }
    check_free(state, &entry)?;

    state.store.put_schedule_entry(&entry)?;
    tracing::info!(entry = %entry.id, "schedule entry updated");
    let names = teacher_names(state)?;
    Ok(json!({ "entry": entry_row(&entry, &names) }))
}

fn schedule_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageSchedule)?;
    let entry_id = required_str(params, "entryId")?;
    if !state.store.delete_schedule_entry(&entry_id)? {
        return Err(HandlerErr::not_found("schedule entry", &entry_id));
    }
    tracing::info!(entry = %entry_id, "schedule entry deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "schedule.list" => schedule_list(state, &req.params),
        "schedule.mine" => schedule_mine(state),
        "schedule.create" => schedule_create(state, &req.params),
        "schedule.update" => schedule_update(state, &req.params),
        "schedule.delete" => schedule_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
