use crate::filters::ListFilter;
use crate::ipc::handlers::setup::{check_school_keys, SchoolKeys};
use crate::ipc::helpers::{
    list_filter, optional_date, optional_str, own_class, require, required_date, required_str,
    respond, today, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{Capability, Role, Session};
use crate::store::new_id;
use crate::timeline::{
    classify, progress, Chapter, ChapterStatus, TimelineStatus, TransitionError,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;

fn as_of(params: &Value) -> Result<NaiveDate, HandlerErr> {
    Ok(optional_date(params, "asOf")?.unwrap_or_else(today))
}

fn chapter_row(ch: &Chapter, as_of: NaiveDate) -> Value {
    let timeline = classify(ch, as_of);
    let mut row = json!(ch);
    row["timelineStatus"] = json!(timeline);
    row["timelineLabel"] = json!(timeline.map(TimelineStatus::label));
    row
}

/// Chapters the session may see. Student accounts only see their own class.
fn visible_chapters(state: &AppState, session: &Session) -> Result<Vec<Chapter>, HandlerErr> {
    let chapters = state.store.list_chapters()?;
    if session.role() != Role::Student {
        return Ok(chapters);
    }
    Ok(match own_class(state, session)? {
        Some(c) => chapters.into_iter().filter(|ch| ch.class_name == c).collect(),
        None => Vec::new(),
    })
}

fn editable_chapter(
    state: &AppState,
    session: &Session,
    chapter_id: &str,
) -> Result<Chapter, HandlerErr> {
    let chapter = state
        .store
        .get_chapter(chapter_id)?
        .ok_or_else(|| HandlerErr::not_found("chapter", chapter_id))?;
    if !session.can_edit_chapter(chapter.owner_id.as_deref()) {
        return Err(HandlerErr::new(
            "forbidden",
            "only the owning professor or an admin can change this chapter",
        ));
    }
    Ok(chapter)
}

fn check_chapter_keys(state: &AppState, chapter: &Chapter) -> Result<(), HandlerErr> {
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: Some(chapter.class_name.as_str()),
            subject: Some(chapter.subject.as_str()),
            term: None,
        },
    )
}

fn check_planned_range(start: NaiveDate, end: NaiveDate) -> Result<(), HandlerErr> {
    if end < start {
        return Err(HandlerErr::bad_params(
            "plannedEndDate must not precede plannedStartDate",
        ));
    }
    Ok(())
}

fn parse_materials(params: &Value) -> Result<Option<u32>, HandlerErr> {
    match params.get("materials") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("materials must be a non-negative integer")),
    }
}

fn chapters_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::ViewChapters)?;
    let filter = list_filter(params)?;
    let as_of = as_of(params)?;
    let chapters = filter.apply(visible_chapters(state, &session)?);
    let mut documents: HashMap<String, usize> = HashMap::new();
    for m in state.store.list_materials()? {
        if let Some(chapter_id) = m.chapter_id {
            *documents.entry(chapter_id).or_default() += 1;
        }
    }
    let rows: Vec<Value> = chapters
        .iter()
        .map(|ch| {
            let mut row = chapter_row(ch, as_of);
            row["documentCount"] = json!(documents.get(&ch.id).copied().unwrap_or(0));
            row
        })
        .collect();
    Ok(json!({
        "asOf": as_of,
        "chapters": rows,
        "progress": progress(&chapters),
    }))
}

fn chapters_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::PlanChapters)?;
    let planned_start_date = required_date(params, "plannedStartDate")?;
    let planned_end_date = required_date(params, "plannedEndDate")?;
    check_planned_range(planned_start_date, planned_end_date)?;
    let chapter = Chapter {
        id: new_id(),
        title: required_str(params, "title")?,
        description: optional_str(params, "description").unwrap_or_default(),
        subject: required_str(params, "subject")?,
        class_name: required_str(params, "className")?,
        planned_start_date,
        planned_end_date,
        actual_start_date: None,
        actual_end_date: None,
        status: ChapterStatus::Planned,
        materials: parse_materials(params)?.unwrap_or(0),
        owner_id: Some(session.user.id.clone()),
    };
    check_chapter_keys(state, &chapter)?;
    state.store.put_chapter(&chapter)?;
    tracing::info!(chapter = %chapter.id, owner = %session.user.id, "chapter planned");
    Ok(json!({ "chapter": chapter_row(&chapter, today()) }))
}

fn chapters_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::PlanChapters)?;
    let chapter_id = required_str(params, "chapterId")?;
    let mut chapter = editable_chapter(state, &session, &chapter_id)?;

    if let Some(title) = optional_str(params, "title") {
        chapter.title = title;
    }
    if let Some(v) = params.get("description") {
        chapter.description = v.as_str().map(str::trim).unwrap_or_default().to_string();
    }
    if let Some(subject) = optional_str(params, "subject") {
        chapter.subject = subject;
    }
    if let Some(class_name) = optional_str(params, "className") {
        chapter.class_name = class_name;
    }
    if let Some(start) = optional_date(params, "plannedStartDate")? {
        chapter.planned_start_date = start;
    }
    if let Some(end) = optional_date(params, "plannedEndDate")? {
        chapter.planned_end_date = end;
    }
    if let Some(materials) = parse_materials(params)? {
        chapter.materials = materials;
    }
    check_planned_range(chapter.planned_start_date, chapter.planned_end_date)?;
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            class_name: params.get("className").map(|_| chapter.class_name.as_str()),
            subject: params.get("subject").map(|_| chapter.subject.as_str()),
            term: None,
        },
    )?;

    state.store.put_chapter(&chapter)?;
    tracing::info!(chapter = %chapter.id, "chapter updated");
    Ok(json!({ "chapter": chapter_row(&chapter, today()) }))
}

fn chapters_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::PlanChapters)?;
    let chapter_id = required_str(params, "chapterId")?;
    editable_chapter(state, &session, &chapter_id)?;
    state.store.delete_chapter(&chapter_id)?;
    tracing::info!(chapter = %chapter_id, "chapter deleted");
    Ok(json!({ "deleted": true }))
}

fn transition(
    state: &mut AppState,
    params: &Value,
    step: fn(&mut Chapter, NaiveDate) -> Result<(), TransitionError>,
) -> Result<Value, HandlerErr> {
    let session = require(state, Capability::PlanChapters)?;
    let chapter_id = required_str(params, "chapterId")?;
    let now = today();
    let date = optional_date(params, "date")?.unwrap_or(now);
    if date > now {
        return Err(HandlerErr::bad_params(format!(
            "date {} is in the future",
            date
        )));
    }
    let mut chapter = editable_chapter(state, &session, &chapter_id)?;
    step(&mut chapter, date)?;
    state.store.put_chapter(&chapter)?;
    tracing::info!(
        chapter = %chapter.id,
        status = chapter.status.as_str(),
        %date,
        "chapter status changed"
    );
    Ok(json!({ "chapter": chapter_row(&chapter, date) }))
}

fn chapters_monitor(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::MonitorChapters)?;
    let filter = list_filter(params)?;
    let as_of = as_of(params)?;
    let chapters = filter.apply(state.store.list_chapters()?);

    let mut by_timeline = serde_json::Map::new();
    for status in [
        TimelineStatus::OnTime,
        TimelineStatus::SlightDelay,
        TimelineStatus::Delayed,
        TimelineStatus::Overdue,
        TimelineStatus::OnTrack,
    ] {
        let n = chapters
            .iter()
            .filter(|ch| classify(ch, as_of) == Some(status))
            .count();
        by_timeline.insert(status.as_str().to_string(), json!(n));
    }

    // Professors are narrowed by class, subject and name; dates only apply to chapters.
    let professor_filter = ListFilter {
        from: None,
        to: None,
        ..filter.clone()
    };
    let professors: Vec<Value> = professor_filter
        .apply(state.store.list_users()?)
        .into_iter()
        .filter(|u| u.role == Role::Professor)
        .map(|u| {
            let owned: Vec<&Chapter> = chapters
                .iter()
                .filter(|ch| ch.owner_id.as_deref() == Some(u.id.as_str()))
                .collect();
            let summary = progress(owned.iter().copied());
            json!({
                "userId": u.id,
                "name": u.name,
                "classes": u.classes,
                "subjects": u.subjects,
                "chapterCount": summary.total,
                "completedCount": summary.completed,
                "completionPercent": summary.completion_percent,
                "timelineAdherencePercent": summary.timeline_adherence_percent,
            })
        })
        .collect();

    let rows: Vec<Value> = chapters.iter().map(|ch| chapter_row(ch, as_of)).collect();
    Ok(json!({
        "asOf": as_of,
        "progress": progress(&chapters),
        "byTimelineStatus": by_timeline,
        "professors": professors,
        "chapters": rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "chapters.list" => chapters_list(state, &req.params),
        "chapters.create" => chapters_create(state, &req.params),
        "chapters.update" => chapters_update(state, &req.params),
        "chapters.delete" => chapters_delete(state, &req.params),
        "chapters.start" => transition(state, &req.params, Chapter::start),
        "chapters.complete" => transition(state, &req.params, Chapter::complete),
        "chapters.monitor" => chapters_monitor(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
