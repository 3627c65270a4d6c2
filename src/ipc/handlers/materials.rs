use std::collections::HashMap;

use chrono::NaiveDate;

use crate::courses::{size_label, sort_materials, Course, Material, MaterialKind, MaterialOrder};
use crate::filters::{Filterable, ListFilter};
use crate::ipc::handlers::courses::visible_courses;
use crate::ipc::handlers::schedule::teacher_names;
use crate::ipc::helpers::{
    optional_date, optional_str, require, required_str, respond, today, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{Capability, Role, Session};
use crate::store::new_id;
use serde_json::{json, Value};

/// Class and subject filters go through the owning course.
struct MaterialView<'a> {
    material: &'a Material,
    course: &'a Course,
}

impl Filterable for MaterialView<'_> {
    fn class_names(&self) -> Vec<&str> {
        self.course.class_names()
    }

    fn subjects(&self) -> Vec<&str> {
        self.course.subjects()
    }

    fn search_text(&self) -> Vec<&str> {
        self.material.search_text()
    }

    fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.material.date_span()
    }
}

fn forbidden(message: &str) -> HandlerErr {
    HandlerErr::new("forbidden", message)
}

fn materials_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ViewCourses)?;
    let order = match optional_str(params, "order") {
        Some(raw) => MaterialOrder::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("order must be one of: recent, oldest"))?,
        None => MaterialOrder::default(),
    };
    let filter = ListFilter {
        class_name: optional_str(params, "className"),
        subject: optional_str(params, "subject"),
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };
    let course_id = optional_str(params, "courseId");
    let chapter_id = optional_str(params, "chapterId");

    let courses: HashMap<String, Course> = visible_courses(state, &session)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let mut items: Vec<Material> = state
        .store
        .list_materials()?
        .into_iter()
        .filter(|m| course_id.as_ref().map_or(true, |id| &m.course_id == id))
        .filter(|m| chapter_id.is_none() || m.chapter_id == chapter_id)
        .filter(|m| {
            courses.get(&m.course_id).is_some_and(|course| {
                filter.matches(&MaterialView {
                    material: m,
                    course,
                })
            })
        })
        .collect();
    sort_materials(&mut items, order);

    let chapters: HashMap<String, String> = state
        .store
        .list_chapters()?
        .into_iter()
        .map(|c| (c.id, c.title))
        .collect();
    let names = teacher_names(state)?;
    let rows: Vec<Value> = items
        .iter()
        .map(|m| {
            let course = courses.get(&m.course_id);
            let mut row = json!(m);
            row["sizeLabel"] = json!(size_label(m.size_bytes));
            row["courseName"] = json!(course.map(|c| &c.name));
            row["subject"] = json!(course.map(|c| &c.subject));
            row["chapterTitle"] = json!(m.chapter_id.as_ref().and_then(|id| chapters.get(id)));
            row["ownerName"] = json!(m.owner_id.as_ref().and_then(|id| names.get(id)));
            row
        })
        .collect();
    Ok(json!({ "count": rows.len(), "materials": rows }))
}

/// Professors only share on courses they teach.
fn check_course_owner(session: &Session, course: &Course) -> Result<(), HandlerErr> {
    if session.role() == Role::Professor
        && course.professor_id.as_deref() != Some(session.user.id.as_str())
    {
        return Err(forbidden("only the course professor can share materials on it"));
    }
    Ok(())
}

fn materials_add(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ShareMaterials)?;
    let course_id = required_str(params, "courseId")?;
    let course = state
        .store
        .get_course(&course_id)?
        .ok_or_else(|| HandlerErr::not_found("course", &course_id))?;
    check_course_owner(&session, &course)?;

    let name = required_str(params, "name")?;
    let size_bytes = match params.get("sizeBytes") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| HandlerErr::bad_params("sizeBytes must be a non-negative integer"))?,
    };
    let chapter_id = optional_str(params, "chapterId");
    if let Some(id) = chapter_id.as_deref() {
        if state.store.get_chapter(id)?.is_none() {
            return Err(HandlerErr::not_found("chapter", id));
        }
    }
    let published_on = optional_date(params, "publishedOn")?.unwrap_or_else(today);

    let material = Material {
        id: new_id(),
        course_id: course.id.clone(),
        chapter_id,
        kind: MaterialKind::from_file_name(&name),
        name,
        size_bytes,
        description: optional_str(params, "description").unwrap_or_default(),
        published_on,
        owner_id: Some(session.user.id.clone()),
    };
    state.store.put_material(&material)?;
    tracing::info!(
        material = %material.id,
        course = %course.id,
        kind = material.kind.as_str(),
        "material shared"
    );

    let mut row = json!(material);
    row["sizeLabel"] = json!(size_label(material.size_bytes));
    row["courseName"] = json!(course.name);
    Ok(json!({ "material": row }))
}

fn materials_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ShareMaterials)?;
    let material_id = required_str(params, "materialId")?;
    let material = state
        .store
        .get_material(&material_id)?
        .ok_or_else(|| HandlerErr::not_found("material", &material_id))?;
    if session.role() == Role::Professor
        && material.owner_id.as_deref() != Some(session.user.id.as_str())
    {
        return Err(forbidden("only the owner can remove this material"));
    }
    state.store.delete_material(&material_id)?;
    tracing::info!(material = %material_id, "material removed");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "materials.list" => materials_list(state, &req.params),
        "materials.add" => materials_add(state, &req.params),
        "materials.delete" => materials_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
