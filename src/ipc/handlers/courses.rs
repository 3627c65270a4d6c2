use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::courses::{Course, CourseStatus, Material};
use crate::filters::Filterable;
use crate::ipc::handlers::schedule::teacher_names;
use crate::ipc::handlers::setup::{check_school_keys, SchoolKeys};
use crate::ipc::helpers::{
    existing_professor, list_filter, nullable_str, optional_bool, optional_date, optional_str,
    own_class, require, required_str, respond, string_list, today, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{next_session, ScheduleEntry};
use crate::session::{Capability, Role, Session};
use crate::store::{new_id, Student};
use serde_json::{json, Value};

fn parse_status(raw: &str) -> Result<CourseStatus, HandlerErr> {
    CourseStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be one of: active, inactive"))
}

/// Courses the session may read. Students only see active courses given
/// to their own class.
pub(crate) fn visible_courses(
    state: &AppState,
    session: &Session,
) -> Result<Vec<Course>, HandlerErr> {
    let courses = state.store.list_courses()?;
    if session.role() != Role::Student {
        return Ok(courses);
    }
    Ok(match own_class(state, session)? {
        Some(class_name) => courses
            .into_iter()
            .filter(|c| c.is_active() && c.taught_to(&class_name))
            .collect(),
        None => Vec::new(),
    })
}

fn check_course_keys(
    state: &AppState,
    subject: Option<&str>,
    classes: &[String],
) -> Result<(), HandlerErr> {
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            subject,
            ..SchoolKeys::default()
        },
    )?;
    for class_name in classes {
        check_school_keys(
            state.store.as_ref(),
            SchoolKeys {
                class_name: Some(class_name.as_str()),
                ..SchoolKeys::default()
            },
        )?;
    }
    Ok(())
}

/// Search also covers the professor's display name.
struct CourseView<'a> {
    course: &'a Course,
    professor_name: Option<&'a str>,
}

impl Filterable for CourseView<'_> {
    fn class_names(&self) -> Vec<&str> {
        self.course.class_names()
    }

    fn subjects(&self) -> Vec<&str> {
        self.course.subjects()
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = self.course.search_text();
        text.extend(self.professor_name);
        text
    }
}

struct CourseContext<'a> {
    names: &'a HashMap<String, String>,
    students: &'a [Student],
    materials: &'a [Material],
    schedule: &'a [ScheduleEntry],
    as_of: NaiveDate,
}

fn course_row(course: &Course, ctx: &CourseContext) -> Value {
    let sessions: Vec<&ScheduleEntry> = ctx
        .schedule
        .iter()
        .filter(|e| e.subject == course.subject && course.taught_to(&e.class_name))
        .collect();
    let next = next_session(&sessions, ctx.as_of).map(|(date, e)| {
        json!({
            "date": date.to_string(),
            "day": e.day,
            "dayLabel": e.day.label(),
            "slot": e.slot,
            "class": e.class_name,
            "room": e.room,
        })
    });

    let mut row = json!(course);
    row["statusLabel"] = json!(course.status.label());
    row["professorName"] = json!(course.professor_id.as_ref().and_then(|id| ctx.names.get(id)));
    row["studentCount"] = json!(ctx
        .students
        .iter()
        .filter(|s| course.taught_to(&s.class_name))
        .count());
    row["materialCount"] = json!(ctx
        .materials
        .iter()
        .filter(|m| m.course_id == course.id)
        .count());
    row["nextSession"] = json!(next);
    row
}

fn courses_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ViewCourses)?;
    let filter = list_filter(params)?;
    let status = optional_str(params, "status")
        .map(|s| parse_status(&s))
        .transpose()?;
    let mine = optional_bool(params, "mine")?.unwrap_or(false);
    let as_of = optional_date(params, "asOf")?.unwrap_or_else(today);

    let names = teacher_names(state)?;
    let courses: Vec<Course> = visible_courses(state, &session)?
        .into_iter()
        .filter(|c| status.map_or(true, |s| c.status == s))
        .filter(|c| !mine || c.professor_id.as_deref() == Some(session.user.id.as_str()))
        .filter(|c| {
            filter.matches(&CourseView {
                course: c,
                professor_name: c
                    .professor_id
                    .as_ref()
                    .and_then(|id| names.get(id))
                    .map(String::as_str),
            })
        })
        .collect();

    let students = state.store.list_students()?;
    let materials = state.store.list_materials()?;
    let schedule = state.store.list_schedule()?;
    let ctx = CourseContext {
        names: &names,
        students: &students,
        materials: &materials,
        schedule: &schedule,
        as_of,
    };
    let rows: Vec<Value> = courses.iter().map(|c| course_row(c, &ctx)).collect();

    let enrolled: BTreeSet<&str> = students
        .iter()
        .filter(|s| courses.iter().any(|c| c.taught_to(&s.class_name)))
        .map(|s| s.id.as_str())
        .collect();
    Ok(json!({
        "courses": rows,
        "summary": {
            "total": courses.len(),
            "activeCount": courses.iter().filter(|c| c.is_active()).count(),
            "totalStudents": enrolled.len(),
        },
    }))
}

fn courses_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageCourses)?;
    let mut course = Course {
        id: new_id(),
        name: required_str(params, "name")?,
        subject: required_str(params, "subject")?,
        description: optional_str(params, "description").unwrap_or_default(),
        level: optional_str(params, "level").unwrap_or_default(),
        classes: string_list(params, "classes")?.unwrap_or_default(),
        professor_id: nullable_str(params, "professorId")?.flatten(),
        status: optional_str(params, "status")
            .map(|s| parse_status(&s))
            .transpose()?
            .unwrap_or_default(),
    };
    course.classes.sort();
    course.classes.dedup();
    check_course_keys(state, Some(course.subject.as_str()), &course.classes)?;
    if let Some(id) = course.professor_id.as_deref() {
        existing_professor(state, id)?;
    }

    state.store.put_course(&course)?;
    tracing::info!(course = %course.id, subject = %course.subject, "course created");
    let names = teacher_names(state)?;
    let mut row = json!(course);
    row["professorName"] = json!(course.professor_id.as_ref().and_then(|id| names.get(id)));
    Ok(json!({ "course": row }))
}

fn courses_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageCourses)?;
    let course_id = required_str(params, "courseId")?;
    let mut course = state
        .store
        .get_course(&course_id)?
        .ok_or_else(|| HandlerErr::not_found("course", &course_id))?;

    let subject = optional_str(params, "subject");
    let classes = string_list(params, "classes")?;
    check_course_keys(state, subject.as_deref(), classes.as_deref().unwrap_or_default())?;

    if let Some(name) = optional_str(params, "name") {
        course.name = name;
    }
    if let Some(subject) = subject {
        course.subject = subject;
    }
    if let Some(mut classes) = classes {
        classes.sort();
        classes.dedup();
        course.classes = classes;
    }
    if let Some(v) = params.get("description") {
        course.description = v.as_str().map(str::trim).unwrap_or_default().to_string();
    }
    if let Some(v) = params.get("level") {
        course.level = v.as_str().map(str::trim).unwrap_or_default().to_string();
    }
    if let Some(status) = optional_str(params, "status") {
        course.status = parse_status(&status)?;
    }
    if let Some(professor_id) = nullable_str(params, "professorId")? {
        if let Some(id) = professor_id.as_deref() {
            existing_professor(state, id)?;
        }
        course.professor_id = professor_id;
    }

    state.store.put_course(&course)?;
    tracing::info!(course = %course.id, status = course.status.as_str(), "course updated");
    Ok(json!({ "course": course }))
}

fn courses_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageCourses)?;
    let course_id = required_str(params, "courseId")?;
    let attached = state
        .store
        .list_materials()?
        .iter()
        .filter(|m| m.course_id == course_id)
        .count();
    if !state.store.delete_course(&course_id)? {
        return Err(HandlerErr::not_found("course", &course_id));
    }
    tracing::info!(course = %course_id, materials = attached, "course deleted");
    Ok(json!({ "deleted": true, "materialsRemoved": attached }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "courses.list" => courses_list(state, &req.params),
        "courses.create" => courses_create(state, &req.params),
        "courses.update" => courses_update(state, &req.params),
        "courses.delete" => courses_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
