use crate::calc::{mean, sheet_summary, GradeComponent, GradeRecord};
use crate::filters::ListFilter;
use crate::ipc::handlers::setup::{check_school_keys, grading_settings, SchoolKeys};
use crate::ipc::helpers::{
    existing_student, optional_str, readable_student, require, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::Capability;
use crate::store::{SheetKey, Student};
use serde_json::{json, Value};

fn sheet_key(state: &AppState, params: &Value) -> Result<SheetKey, HandlerErr> {
    let key = SheetKey {
        subject: required_str(params, "subject")?,
        term: required_str(params, "term")?,
    };
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            subject: Some(key.subject.as_str()),
            term: Some(key.term.as_str()),
            ..SchoolKeys::default()
        },
    )?;
    Ok(key)
}

fn grade_row(student: Option<&Student>, record: &GradeRecord) -> Value {
    json!({
        "studentId": record.student_id,
        "displayName": student.map(|s| s.display_name.as_str()),
        "homework1": record.homework1,
        "homework2": record.homework2,
        "exam": record.exam,
        "average": record.average(),
    })
}

/// Sheet records for `students`, in roster order; missing rows are blank.
fn roster_records(
    state: &AppState,
    key: &SheetKey,
    students: &[Student],
) -> Result<Vec<GradeRecord>, HandlerErr> {
    let stored = state.store.sheet_grades(key)?;
    Ok(students
        .iter()
        .map(|s| {
            stored
                .iter()
                .find(|r| r.student_id == s.id)
                .cloned()
                .unwrap_or_else(|| GradeRecord::new(s.id.clone()))
        })
        .collect())
}

fn grades_open(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::EnterGrades)?;
    let class_name = required_str(params, "className")?;
    let key = sheet_key(state, params)?;
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: Some(class_name.as_str()),
            ..SchoolKeys::default()
        },
    )?;
    let filter = ListFilter {
        class_name: Some(class_name.clone()),
        ..ListFilter::default()
    };
    let students = filter.apply(state.store.list_students()?);
    let records = roster_records(state, &key, &students)?;
    let grading = grading_settings(state.store.as_ref())?;

    let rows: Vec<Value> = students
        .iter()
        .zip(records.iter())
        .map(|(s, r)| grade_row(Some(s), r))
        .collect();
    Ok(json!({
        "className": class_name,
        "subject": key.subject,
        "term": key.term,
        "rows": rows,
        "summary": sheet_summary(&records, grading.pass_mark),
        "passMark": grading.pass_mark,
    }))
}

fn grades_set(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::EnterGrades)?;
    let key = sheet_key(state, params)?;
    let student_id = required_str(params, "studentId")?;
    let component_raw = required_str(params, "component")?;
    let component = GradeComponent::parse(&component_raw).ok_or_else(|| {
        HandlerErr::bad_params("component must be one of: homework1, homework2, exam")
    })?;
    let student = existing_student(state, &student_id)?;

    let mut record = state
        .store
        .sheet_grades(&key)?
        .into_iter()
        .find(|r| r.student_id == student_id)
        .unwrap_or_else(|| GradeRecord::new(student_id.clone()));

    let previous = record.get(component);
    let applied = match params.get("value") {
        Some(Value::Number(n)) => n.as_f64().map_or(false, |v| record.set(component, v)),
        Some(Value::String(s)) => record.set_text(component, s),
        _ => false,
    };
    if applied {
        state.store.put_grade(&key, &record)?;
        tracing::info!(
            student = %student_id,
            subject = %key.subject,
            term = %key.term,
            component = component.as_str(),
            ?previous,
            "grade updated"
        );
    } else {
        tracing::debug!(student = %student_id, component = component.as_str(), "grade input ignored");
    }
    Ok(json!({
        "applied": applied,
        "row": grade_row(Some(&student), &record),
    }))
}

fn grades_student(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = readable_student(state, &student_id)?;
    let term = optional_str(params, "term");

    let rows: Vec<(SheetKey, GradeRecord)> = state
        .store
        .student_grades(&student_id)?
        .into_iter()
        .filter(|(k, _)| term.as_ref().map_or(true, |t| &k.term == t))
        .collect();
    let averages: Vec<f64> = rows.iter().filter_map(|(_, r)| r.average()).collect();
    let subjects: Vec<Value> = rows
        .iter()
        .map(|(k, r)| {
            let mut row = grade_row(None, r);
            row["subject"] = json!(k.subject);
            row["term"] = json!(k.term);
            row
        })
        .collect();
    Ok(json!({
        "student": student,
        "term": term,
        "subjects": subjects,
        "overallAverage": mean(&averages),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.open" => grades_open(state, &req.params),
        "grades.set" => grades_set(state, &req.params),
        "grades.student" => grades_student(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
