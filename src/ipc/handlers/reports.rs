use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::calc::{
    competition_ranks, mean, round_2_decimals, tally, AttendanceStatus, AttendanceTally, GradeRecord,
};
use crate::filters::ListFilter;
use crate::ipc::handlers::setup::{
    check_school_keys, grading_settings, term_window, SchoolKeys, TermWindow,
};
use crate::ipc::helpers::{optional_str, readable_student, require, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{Capability, Role};
use crate::store::{BulletinComments, SheetKey, Student};
use crate::timeline::progress;
use serde_json::{json, Value};

/// One student's marks for a term and the mean of their subject averages.
struct TermResult {
    student: Student,
    subjects: Vec<(String, GradeRecord)>,
    overall: Option<f64>,
}

fn grades_by_student(
    state: &AppState,
    term: Option<&str>,
) -> Result<HashMap<String, Vec<(SheetKey, GradeRecord)>>, HandlerErr> {
    let mut out: HashMap<String, Vec<(SheetKey, GradeRecord)>> = HashMap::new();
    for (key, record) in state.store.all_grades()? {
        if term.map_or(true, |t| key.term == t) {
            out.entry(record.student_id.clone())
                .or_default()
                .push((key, record));
        }
    }
    Ok(out)
}

fn term_results(
    students: Vec<Student>,
    grades: &HashMap<String, Vec<(SheetKey, GradeRecord)>>,
) -> Vec<TermResult> {
    students
        .into_iter()
        .map(|student| {
            let subjects: Vec<(String, GradeRecord)> = grades
                .get(&student.id)
                .map(|rows| {
                    rows.iter()
                        .map(|(k, r)| (k.subject.clone(), r.clone()))
                        .collect()
                })
                .unwrap_or_default();
            let averages: Vec<f64> = subjects.iter().filter_map(|(_, r)| r.average()).collect();
            TermResult {
                student,
                subjects,
                overall: mean(&averages),
            }
        })
        .collect()
}

fn class_results(
    state: &AppState,
    class_name: &str,
    term: &str,
) -> Result<Vec<TermResult>, HandlerErr> {
    let filter = ListFilter {
        class_name: Some(class_name.to_string()),
        ..ListFilter::default()
    };
    let students = filter.apply(state.store.list_students()?);
    let grades = grades_by_student(state, Some(term))?;
    Ok(term_results(students, &grades))
}

fn rank_label(rank: Option<usize>, class_size: usize) -> Option<String> {
    rank.map(|r| format!("{}/{}", r, class_size))
}

/// Attendance tally for a student, limited to the term's dates when the
/// school has configured them.
fn student_tally(
    state: &AppState,
    student_id: &str,
    window: Option<TermWindow>,
) -> Result<AttendanceTally, HandlerErr> {
    let entries = state.store.student_attendance(student_id)?;
    Ok(tally(
        entries
            .into_iter()
            .filter(|(key, _)| window.map_or(true, |w| w.contains(key.date)))
            .map(|(_, r)| r.status),
    ))
}

/// Validates the term name and returns its configured date window.
fn bulletin_term(state: &AppState, term: &str) -> Result<Option<TermWindow>, HandlerErr> {
    check_school_keys(
        state.store.as_ref(),
        SchoolKeys {
            term: Some(term),
            ..SchoolKeys::default()
        },
    )?;
    Ok(term_window(state.store.as_ref(), term)?)
}

fn window_json(window: Option<TermWindow>) -> Value {
    match window {
        Some(w) => json!({ "from": w.from, "to": w.to }),
        None => Value::Null,
    }
}

fn reports_bulletin(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let term = required_str(params, "term")?;
    let student = readable_student(state, &student_id)?;
    let window = bulletin_term(state, &term)?;
    let grading = grading_settings(state.store.as_ref())?;

    let results = class_results(state, &student.class_name, &term)?;
    let ranks = competition_ranks(&results.iter().map(|r| r.overall).collect::<Vec<_>>());
    let Some(pos) = results.iter().position(|r| r.student.id == student_id) else {
        return Err(HandlerErr::not_found("student", &student_id));
    };
    let me = &results[pos];

    let subjects: Vec<Value> = me
        .subjects
        .iter()
        .map(|(subject, record)| {
            let class_averages: Vec<f64> = results
                .iter()
                .flat_map(|r| r.subjects.iter())
                .filter(|(s, _)| s == subject)
                .filter_map(|(_, r)| r.average())
                .collect();
            json!({
                "subject": subject,
                "homework1": record.homework1,
                "homework2": record.homework2,
                "exam": record.exam,
                "average": record.average(),
                "classAverage": mean(&class_averages),
            })
        })
        .collect();

    let attendance = student_tally(state, &student_id, window)?;
    let comments = state
        .store
        .get_comments(&student_id, &term)?
        .unwrap_or_else(|| BulletinComments {
            student_id: student_id.clone(),
            term: term.clone(),
            ..BulletinComments::default()
        });
    let rank = if grading.show_rank {
        rank_label(ranks[pos], results.len())
    } else {
        None
    };

    Ok(json!({
        "student": student,
        "term": term,
        "subjects": subjects,
        "average": me.overall,
        "passMark": grading.pass_mark,
        "passed": me.overall.map(|a| a >= grading.pass_mark),
        "rank": rank,
        "attendance": attendance,
        "attendancePeriod": window_json(window),
        "teacherComment": comments.teacher_comment,
        "principalComment": comments.principal_comment,
    }))
}

fn reports_class_bulletins(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ViewReports)?;
    let class_name = required_str(params, "className")?;
    let term = required_str(params, "term")?;
    let window = bulletin_term(state, &term)?;
    let grading = grading_settings(state.store.as_ref())?;

    let results = class_results(state, &class_name, &term)?;
    let ranks = competition_ranks(&results.iter().map(|r| r.overall).collect::<Vec<_>>());
    let class_size = results.len();
    let search = ListFilter {
        search: optional_str(params, "search"),
        ..ListFilter::default()
    };

    let mut rows: Vec<(Option<usize>, Value)> = Vec::new();
    for (result, rank) in results.iter().zip(ranks.iter().copied()) {
        if !search.matches(&result.student) {
            continue;
        }
        let attendance = student_tally(state, &result.student.id, window)?;
        let has_comments = state
            .store
            .get_comments(&result.student.id, &term)?
            .map_or(false, |c| {
                !c.teacher_comment.is_empty() || !c.principal_comment.is_empty()
            });
        let rank_text = if grading.show_rank {
            rank_label(rank, class_size)
        } else {
            None
        };
        rows.push((
            rank,
            json!({
                "studentId": result.student.id,
                "displayName": result.student.display_name,
                "average": result.overall,
                "passed": result.overall.map(|a| a >= grading.pass_mark),
                "rank": rank_text,
                "absences": attendance.absent(),
                "justifiedAbsences": attendance.absent_justified,
                "hasComments": has_comments,
            }),
        ));
    }
    // Ranked rows first, best rank on top; unranked keep roster order.
    rows.sort_by_key(|(rank, _)| rank.unwrap_or(usize::MAX));

    let averages: Vec<f64> = results.iter().filter_map(|r| r.overall).collect();
    Ok(json!({
        "className": class_name,
        "term": term,
        "classSize": class_size,
        "classAverage": mean(&averages),
        "attendancePeriod": window_json(window),
        "bulletins": rows.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
    }))
}

fn comment_param(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(String::new())),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

fn reports_set_comments(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ViewReports)?;
    let student_id = required_str(params, "studentId")?;
    let term = required_str(params, "term")?;
    readable_student(state, &student_id)?;

    let mut comments = state
        .store
        .get_comments(&student_id, &term)?
        .unwrap_or_else(|| BulletinComments {
            student_id: student_id.clone(),
            term: term.clone(),
            ..BulletinComments::default()
        });
    if let Some(c) = comment_param(params, "teacherComment")? {
        comments.teacher_comment = c;
    }
    if let Some(c) = comment_param(params, "principalComment")? {
        comments.principal_comment = c;
    }
    state.store.put_comments(&comments)?;
    tracing::info!(student = %student_id, %term, "bulletin comments saved");
    Ok(json!({ "comments": comments }))
}

fn reports_statistics(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    require(state, Capability::ViewStatistics)?;
    let term = optional_str(params, "term");
    let grading = grading_settings(state.store.as_ref())?;

    let students = state.store.list_students()?;
    let grades = grades_by_student(state, term.as_deref())?;
    let results = term_results(students, &grades);

    let mut statuses_by_class: HashMap<String, Vec<AttendanceStatus>> = HashMap::new();
    for (key, record) in state.store.all_attendance()? {
        statuses_by_class
            .entry(key.class_name)
            .or_default()
            .push(record.status);
    }

    let class_names: BTreeSet<&str> = results
        .iter()
        .map(|r| r.student.class_name.as_str())
        .collect();
    let mut classes: Vec<Value> = Vec::new();
    for class_name in class_names {
        let members: Vec<&TermResult> = results
            .iter()
            .filter(|r| r.student.class_name == class_name)
            .collect();
        let averages: Vec<f64> = members.iter().filter_map(|r| r.overall).collect();
        let passing = averages.iter().filter(|a| **a >= grading.pass_mark).count();
        let attendance = tally(
            statuses_by_class
                .get(class_name)
                .into_iter()
                .flatten()
                .copied(),
        );
        classes.push(json!({
            "className": class_name,
            "studentCount": members.len(),
            "average": mean(&averages),
            "passRate": pass_rate(passing, averages.len()),
            "attendanceRate": attendance.attendance_rate(),
            "absences": attendance.absent(),
        }));
    }

    let all_averages: Vec<f64> = results.iter().filter_map(|r| r.overall).collect();
    let all_passing = all_averages
        .iter()
        .filter(|a| **a >= grading.pass_mark)
        .count();
    let overall_attendance = tally(statuses_by_class.values().flatten().copied());

    let mut users_by_role: BTreeMap<&str, usize> = BTreeMap::new();
    for role in [Role::Admin, Role::Professor, Role::Student] {
        users_by_role.insert(role.as_str(), 0);
    }
    for user in state.store.list_users()? {
        *users_by_role.entry(user.role.as_str()).or_default() += 1;
    }
    let chapters = state.store.list_chapters()?;

    Ok(json!({
        "term": term,
        "passMark": grading.pass_mark,
        "studentCount": results.len(),
        "usersByRole": users_by_role,
        "average": mean(&all_averages),
        "passRate": pass_rate(all_passing, all_averages.len()),
        "attendanceRate": overall_attendance.attendance_rate(),
        "chapterProgress": progress(&chapters),
        "classes": classes,
    }))
}

fn pass_rate(passing: usize, graded: usize) -> Option<f64> {
    if graded == 0 {
        return None;
    }
    Some(round_2_decimals(100.0 * passing as f64 / graded as f64))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.bulletin" => reports_bulletin(state, &req.params),
        "reports.classBulletins" => reports_class_bulletins(state, &req.params),
        "reports.setComments" => reports_set_comments(state, &req.params),
        "reports.statistics" => reports_statistics(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
