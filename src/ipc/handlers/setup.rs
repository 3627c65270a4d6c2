use crate::ipc::helpers::{require, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::Capability;
use crate::store::{Store, StoreResult};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Copy)]
enum SetupSection {
    School,
    Grading,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [Self::School, Self::Grading];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "grading" => Some(Self::Grading),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::School => "school",
            Self::Grading => "grading",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Grading => "setup.grading",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "name": "",
            "terms": ["Trimestre 1", "Trimestre 2", "Trimestre 3"],
            "classes": [],
            "subjects": [],
            "termDates": {}
        }),
        SetupSection::Grading => json!({
            "passMark": 10.0,
            "showRank": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_name_list(v: &Value, key: &str, max_items: usize) -> Result<Value, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.len() > max_items {
        return Err(format!("{} may hold at most {} entries", key, max_items));
    }
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = parse_string_max(item, key, 80)?;
        if s.is_empty() {
            return Err(format!("{} entries must not be empty", key));
        }
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(json!(out))
}

fn parse_day(v: &Value, key: &str) -> Result<NaiveDate, String> {
    v.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .ok_or_else(|| format!("{} must be a YYYY-MM-DD date", key))
}

/// `{ "<term>": { "from": date, "to": date } }`, each window non-inverted.
fn parse_term_dates(v: &Value, key: &str) -> Result<Value, String> {
    let obj = v
        .as_object()
        .ok_or_else(|| format!("{} must be an object keyed by term", key))?;
    let mut out = Map::new();
    for (term, window) in obj {
        let term = term.trim();
        if term.is_empty() {
            return Err(format!("{} keys must not be empty", key));
        }
        let from = parse_day(window.get("from").unwrap_or(&Value::Null), "from")?;
        let to = parse_day(window.get("to").unwrap_or(&Value::Null), "to")?;
        if to < from {
            return Err(format!("{}: {} ends before it starts", key, term));
        }
        out.insert(
            term.to_string(),
            json!({ "from": from.to_string(), "to": to.to_string() }),
        );
    }
    Ok(Value::Object(out))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "name" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "terms" => {
                    let terms = parse_name_list(v, k, 12)?;
                    if terms.as_array().map_or(true, |a| a.is_empty()) {
                        return Err("terms must not be empty".into());
                    }
                    obj.insert(k.clone(), terms);
                }
                "classes" | "subjects" => {
                    obj.insert(k.clone(), parse_name_list(v, k, 200)?);
                }
                "termDates" => {
                    obj.insert(k.clone(), parse_term_dates(v, k)?);
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Grading => match k.as_str() {
                "passMark" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 0.0, 20.0)?));
                }
                "showRank" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(store: &dyn Store, section: SetupSection) -> StoreResult<Value> {
    let mut current = default_section(section);
    if let Some(saved) = store.settings_get_json(section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), %msg, "ignoring invalid saved setup");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GradingSettings {
    pub pass_mark: f64,
    pub show_rank: bool,
}

pub(crate) fn grading_settings(store: &dyn Store) -> StoreResult<GradingSettings> {
    let v = load_section(store, SetupSection::Grading)?;
    Ok(GradingSettings {
        pass_mark: v.get("passMark").and_then(Value::as_f64).unwrap_or(10.0),
        show_rank: v.get("showRank").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Dates a term covers, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TermWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TermWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SchoolSettings {
    pub terms: Vec<String>,
    pub classes: Vec<String>,
    pub subjects: Vec<String>,
    pub term_dates: BTreeMap<String, TermWindow>,
}

fn string_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn school_settings(store: &dyn Store) -> StoreResult<SchoolSettings> {
    let v = load_section(store, SetupSection::School)?;
    let mut term_dates = BTreeMap::new();
    if let Some(obj) = v.get("termDates").and_then(Value::as_object) {
        for (term, window) in obj {
            let from = parse_day(window.get("from").unwrap_or(&Value::Null), "from");
            let to = parse_day(window.get("to").unwrap_or(&Value::Null), "to");
            if let (Ok(from), Ok(to)) = (from, to) {
                term_dates.insert(term.clone(), TermWindow { from, to });
            }
        }
    }
    Ok(SchoolSettings {
        terms: string_list(&v, "terms"),
        classes: string_list(&v, "classes"),
        subjects: string_list(&v, "subjects"),
        term_dates,
    })
}

/// Class, subject and term names carried by a request.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SchoolKeys<'a> {
    pub class_name: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub term: Option<&'a str>,
}

fn check_listed(list: &[String], value: Option<&str>, field: &str) -> Result<(), HandlerErr> {
    match value {
        Some(v) if !list.is_empty() && !list.iter().any(|item| item == v) => Err(HandlerErr {
            code: "bad_params",
            message: format!("{} {:?} is not configured for this school", field, v),
            details: Some(json!({ "field": field, "value": v, "allowed": list })),
        }),
        _ => Ok(()),
    }
}

/// Rejects names missing from the configured school lists. A list left
/// empty in setup accepts any name.
pub(crate) fn check_school_keys(store: &dyn Store, keys: SchoolKeys<'_>) -> Result<(), HandlerErr> {
    let school = school_settings(store)?;
    check_listed(&school.classes, keys.class_name, "className")?;
    check_listed(&school.subjects, keys.subject, "subject")?;
    check_listed(&school.terms, keys.term, "term")
}

pub(crate) fn term_window(store: &dyn Store, term: &str) -> StoreResult<Option<TermWindow>> {
    Ok(school_settings(store)?.term_dates.get(term).copied())
}

fn handle_setup_get(state: &mut AppState) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageSettings)?;
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(
            section.name().to_string(),
            load_section(state.store.as_ref(), section)?,
        );
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ManageSettings)?;
    let section_raw = required_str(params, "section")?;
    let section = SetupSection::parse(&section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch_obj = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = load_section(state.store.as_ref(), section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    state.store.settings_set_json(section.key(), &current)?;
    tracing::info!(section = section.name(), "setup updated");
    Ok(json!({ "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state),
        "setup.update" => handle_setup_update(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
