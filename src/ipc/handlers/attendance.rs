use crate::calc::{tally, AttendanceRecord};
use crate::filters::{Filterable, ListFilter};
use crate::ipc::handlers::setup::{check_school_keys, SchoolKeys};
use crate::ipc::helpers::{
    existing_student, optional_date, optional_str, readable_student, require, required_bool,
    required_date, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::Capability;
use crate::store::{SessionKey, Student};
use chrono::NaiveDate;
use serde_json::{json, Value};

fn session_key(state: &AppState, params: &Value) -> Result<SessionKey, HandlerErr> {
    let key = SessionKey {
        class_name: required_str(params, "className")?,
        subject: required_str(params, "subject")?,
        date: required_date(params, "date")?,
    };
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: Some(key.class_name.as_str()),
            subject: Some(key.subject.as_str()),
            ..SchoolKeys::default()
        },
    )?;
    Ok(key)
}

fn attendance_row(student: &Student, record: &AttendanceRecord) -> Value {
    json!({
        "studentId": student.id,
        "displayName": student.display_name,
        "present": record.is_present(),
        "justified": record.is_justified(),
        "status": record.status.code(),
        "comment": record.comment,
    })
}

/// Every roster student of the session's class with their record; students
/// without a stored record are present.
fn session_roster(
    state: &AppState,
    key: &SessionKey,
) -> Result<Vec<(Student, AttendanceRecord)>, HandlerErr> {
    let class_filter = ListFilter {
        class_name: Some(key.class_name.clone()),
        ..ListFilter::default()
    };
    let students = class_filter.apply(state.store.list_students()?);
    let stored = state.store.session_attendance(key)?;
    Ok(students
        .into_iter()
        .map(|s| {
            let record = stored
                .iter()
                .find(|r| r.student_id == s.id)
                .cloned()
                .unwrap_or_else(|| AttendanceRecord::present(s.id.clone()));
            (s, record)
        })
        .collect())
}

fn attendance_open(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageAttendance)?;
    let key = session_key(state, params)?;
    let roster = session_roster(state, &key)?;
    let summary = tally(roster.iter().map(|(_, r)| r.status));

    let search = ListFilter {
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };
    let rows: Vec<Value> = roster
        .iter()
        .filter(|(s, _)| search.matches(s))
        .map(|(s, r)| attendance_row(s, r))
        .collect();
    Ok(json!({
        "session": key,
        "rows": rows,
        "tally": summary,
        "attendanceRate": summary.attendance_rate(),
    }))
}

/// Loads, mutates and stores one student's record in a session.
fn update_record(
    state: &mut AppState,
    params: &Value,
    apply: impl FnOnce(&mut AttendanceRecord),
) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageAttendance)?;
    let key = session_key(state, params)?;
    let student_id = required_str(params, "studentId")?;
    let student = existing_student(state, &student_id)?;
    if student.class_name != key.class_name {
        return Err(HandlerErr {
            code: "bad_params",
            message: "student is not in this class".to_string(),
            details: Some(json!({ "studentId": student_id, "className": key.class_name })),
        });
    }

    let mut record = state
        .store
        .session_attendance(&key)?
        .into_iter()
        .find(|r| r.student_id == student_id)
        .unwrap_or_else(|| AttendanceRecord::present(student_id.clone()));
    apply(&mut record);
    state.store.put_attendance(&key, &record)?;
    tracing::info!(
        student = %student_id,
        class = %key.class_name,
        date = %key.date,
        status = record.status.code(),
        "attendance updated"
    );

    let roster = session_roster(state, &key)?;
    let summary = tally(roster.iter().map(|(_, r)| r.status));
    Ok(json!({
        "row": attendance_row(&student, &record),
        "tally": summary,
    }))
}

fn attendance_set_present(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let present = required_bool(params, "present")?;
    update_record(state, params, |r| r.set_present(present))
}

fn attendance_set_justified(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let justified = required_bool(params, "justified")?;
    update_record(state, params, |r| r.set_justified(justified))
}

fn attendance_set_comment(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let comment = match params.get("comment") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(_) => return Err(HandlerErr::bad_params("comment must be a string")),
    };
    update_record(state, params, |r| r.comment = comment)
}

/// One stored attendance entry, filterable by subject and date.
struct DatedEntry {
    key: SessionKey,
    record: AttendanceRecord,
}

impl Filterable for DatedEntry {
    fn class_names(&self) -> Vec<&str> {
        vec![self.key.class_name.as_str()]
    }

    fn subjects(&self) -> Vec<&str> {
        vec![self.key.subject.as_str()]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.key.subject.as_str(), self.record.comment.as_str()]
    }

    fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.key.date, self.key.date))
    }
}

fn attendance_student(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = readable_student(state, &student_id)?;
    let filter = ListFilter {
        subject: optional_str(params, "subject"),
        from: optional_date(params, "from")?,
        to: optional_date(params, "to")?,
        ..ListFilter::default()
    };
    let mut entries: Vec<DatedEntry> = filter.apply(
        state
            .store
            .student_attendance(&student_id)?
            .into_iter()
            .map(|(key, record)| DatedEntry { key, record })
            .collect(),
    );
    entries.sort_by(|a, b| {
        b.key
            .date
            .cmp(&a.key.date)
            .then_with(|| a.key.subject.cmp(&b.key.subject))
    });
    let summary = tally(entries.iter().map(|e| e.record.status));
    let absences: Vec<Value> = entries
        .iter()
        .filter(|e| !e.record.is_present())
        .map(|e| {
            json!({
                "date": e.key.date,
                "subject": e.key.subject,
                "className": e.key.class_name,
                "justified": e.record.is_justified(),
                "comment": e.record.comment,
            })
        })
        .collect();
    Ok(json!({
        "student": student,
        "absences": absences,
        "tally": summary,
        "attendanceRate": summary.attendance_rate(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.open" => attendance_open(state, &req.params),
        "attendance.setPresent" => attendance_set_present(state, &req.params),
        "attendance.setJustified" => attendance_set_justified(state, &req.params),
        "attendance.setComment" => attendance_set_comment(state, &req.params),
        "attendance.student" => attendance_student(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
