use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::calc::{AttendanceRecord, GradeRecord};
use crate::courses::{sort_courses, Course, Material};
use crate::filters::Filterable;
use crate::schedule::{sort_entries, ScheduleEntry};
use crate::session::{Role, User};
use crate::timeline::Chapter;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored data corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub display_name: String,
    pub class_name: String,
}

impl Filterable for Student {
    fn class_names(&self) -> Vec<&str> {
        vec![self.class_name.as_str()]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.display_name.as_str()]
    }
}

/// One grade sheet: every student's marks for a subject in a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetKey {
    pub subject: String,
    pub term: String,
}

/// One attendance session: a class taking a subject on a date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub class_name: String,
    pub subject: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinComments {
    pub student_id: String,
    pub term: String,
    pub teacher_comment: String,
    pub principal_comment: String,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// CRUD over the school entities. `MemoryStore` backs a session with no
/// workspace; `db::SqliteStore` backs a selected workspace.
pub trait Store {
    fn kind(&self) -> &'static str;

    fn list_users(&self) -> StoreResult<Vec<User>>;
    fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    fn put_user(&mut self, user: &User) -> StoreResult<()>;
    /// Also clears the user as teacher, professor or owner elsewhere.
    fn delete_user(&mut self, id: &str) -> StoreResult<bool>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .list_users()?
            .into_iter()
            .find(|u| u.email.to_lowercase() == needle))
    }

    fn list_students(&self) -> StoreResult<Vec<Student>>;
    fn get_student(&self, id: &str) -> StoreResult<Option<Student>>;
    fn put_student(&mut self, student: &Student) -> StoreResult<()>;
    /// Also drops the student's grades, attendance and bulletin comments.
    fn delete_student(&mut self, id: &str) -> StoreResult<bool>;

    fn sheet_grades(&self, key: &SheetKey) -> StoreResult<Vec<GradeRecord>>;
    fn all_grades(&self) -> StoreResult<Vec<(SheetKey, GradeRecord)>>;
    fn put_grade(&mut self, key: &SheetKey, record: &GradeRecord) -> StoreResult<()>;

    fn student_grades(&self, student_id: &str) -> StoreResult<Vec<(SheetKey, GradeRecord)>> {
        Ok(self
            .all_grades()?
            .into_iter()
            .filter(|(_, r)| r.student_id == student_id)
            .collect())
    }

    fn session_attendance(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>>;
    fn all_attendance(&self) -> StoreResult<Vec<(SessionKey, AttendanceRecord)>>;
    fn put_attendance(&mut self, key: &SessionKey, record: &AttendanceRecord) -> StoreResult<()>;

    fn student_attendance(
        &self,
        student_id: &str,
    ) -> StoreResult<Vec<(SessionKey, AttendanceRecord)>> {
        Ok(self
            .all_attendance()?
            .into_iter()
            .filter(|(_, r)| r.student_id == student_id)
            .collect())
    }

    fn list_chapters(&self) -> StoreResult<Vec<Chapter>>;
    fn get_chapter(&self, id: &str) -> StoreResult<Option<Chapter>>;
    fn put_chapter(&mut self, chapter: &Chapter) -> StoreResult<()>;
    /// Materials attached to the chapter stay on their course, unattached.
    fn delete_chapter(&mut self, id: &str) -> StoreResult<bool>;

    fn list_schedule(&self) -> StoreResult<Vec<ScheduleEntry>>;
    fn get_schedule_entry(&self, id: &str) -> StoreResult<Option<ScheduleEntry>>;
    fn put_schedule_entry(&mut self, entry: &ScheduleEntry) -> StoreResult<()>;
    fn delete_schedule_entry(&mut self, id: &str) -> StoreResult<bool>;

    fn list_courses(&self) -> StoreResult<Vec<Course>>;
    fn get_course(&self, id: &str) -> StoreResult<Option<Course>>;
    fn put_course(&mut self, course: &Course) -> StoreResult<()>;
    /// Also drops the course's materials.
    fn delete_course(&mut self, id: &str) -> StoreResult<bool>;

    fn list_materials(&self) -> StoreResult<Vec<Material>>;
    fn get_material(&self, id: &str) -> StoreResult<Option<Material>>;
    fn put_material(&mut self, material: &Material) -> StoreResult<()>;
    fn delete_material(&mut self, id: &str) -> StoreResult<bool>;

    fn get_comments(&self, student_id: &str, term: &str) -> StoreResult<Option<BulletinComments>>;
    fn put_comments(&mut self, comments: &BulletinComments) -> StoreResult<()>;

    fn settings_get_json(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;
    fn settings_set_json(&mut self, key: &str, value: &serde_json::Value) -> StoreResult<()>;
}

/// Creates the first admin account when a store has no users yet.
pub fn bootstrap_admin(store: &mut dyn Store, email: &str) -> StoreResult<Option<User>> {
    if !store.list_users()?.is_empty() {
        return Ok(None);
    }
    let admin = User {
        id: new_id(),
        name: "Administrateur".to_string(),
        email: email.trim().to_string(),
        role: Role::Admin,
        active: true,
        student_id: None,
        classes: Vec::new(),
        subjects: Vec::new(),
    };
    store.put_user(&admin)?;
    Ok(Some(admin))
}

pub(crate) fn sort_users(users: &mut [User]) {
    users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

pub(crate) fn sort_students(students: &mut [Student]) {
    students.sort_by(|a, b| {
        a.class_name
            .cmp(&b.class_name)
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| {
        a.planned_start_date
            .cmp(&b.planned_start_date)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Process-lifetime store; everything is gone when the sidecar exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: BTreeMap<String, User>,
    students: BTreeMap<String, Student>,
    grades: BTreeMap<(SheetKey, String), GradeRecord>,
    attendance: BTreeMap<(SessionKey, String), AttendanceRecord>,
    chapters: BTreeMap<String, Chapter>,
    schedule: BTreeMap<String, ScheduleEntry>,
    courses: BTreeMap<String, Course>,
    materials: BTreeMap<String, Material>,
    comments: BTreeMap<(String, String), BulletinComments>,
    settings: BTreeMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut out: Vec<User> = self.users.values().cloned().collect();
        sort_users(&mut out);
        Ok(out)
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).cloned())
    }

    fn put_user(&mut self, user: &User) -> StoreResult<()> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn delete_user(&mut self, id: &str) -> StoreResult<bool> {
        if self.users.remove(id).is_none() {
            return Ok(false);
        }
        let gone = |v: &mut Option<String>| {
            if v.as_deref() == Some(id) {
                *v = None;
            }
        };
        self.schedule.values_mut().for_each(|e| gone(&mut e.teacher_id));
        self.courses.values_mut().for_each(|c| gone(&mut c.professor_id));
        self.materials.values_mut().for_each(|m| gone(&mut m.owner_id));
        Ok(true)
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let mut out: Vec<Student> = self.students.values().cloned().collect();
        sort_students(&mut out);
        Ok(out)
    }

    fn get_student(&self, id: &str) -> StoreResult<Option<Student>> {
        Ok(self.students.get(id).cloned())
    }

    fn put_student(&mut self, student: &Student) -> StoreResult<()> {
        self.students.insert(student.id.clone(), student.clone());
        Ok(())
    }

    fn delete_student(&mut self, id: &str) -> StoreResult<bool> {
        if self.students.remove(id).is_none() {
            return Ok(false);
        }
        self.grades.retain(|(_, sid), _| sid != id);
        self.attendance.retain(|(_, sid), _| sid != id);
        self.comments.retain(|(sid, _), _| sid != id);
        for user in self.users.values_mut() {
            if user.student_id.as_deref() == Some(id) {
                user.student_id = None;
            }
        }
        Ok(true)
    }

    fn sheet_grades(&self, key: &SheetKey) -> StoreResult<Vec<GradeRecord>> {
        Ok(self
            .grades
            .iter()
            .filter(|((k, _), _)| k == key)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn all_grades(&self) -> StoreResult<Vec<(SheetKey, GradeRecord)>> {
        Ok(self
            .grades
            .iter()
            .map(|((k, _), r)| (k.clone(), r.clone()))
            .collect())
    }

    fn put_grade(&mut self, key: &SheetKey, record: &GradeRecord) -> StoreResult<()> {
        self.grades
            .insert((key.clone(), record.student_id.clone()), record.clone());
        Ok(())
    }

    fn session_attendance(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>> {
        Ok(self
            .attendance
            .iter()
            .filter(|((k, _), _)| k == key)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn all_attendance(&self) -> StoreResult<Vec<(SessionKey, AttendanceRecord)>> {
        Ok(self
            .attendance
            .iter()
            .map(|((k, _), r)| (k.clone(), r.clone()))
            .collect())
    }

    fn put_attendance(&mut self, key: &SessionKey, record: &AttendanceRecord) -> StoreResult<()> {
        self.attendance
            .insert((key.clone(), record.student_id.clone()), record.clone());
        Ok(())
    }

    fn list_chapters(&self) -> StoreResult<Vec<Chapter>> {
        let mut out: Vec<Chapter> = self.chapters.values().cloned().collect();
        sort_chapters(&mut out);
        Ok(out)
    }

    fn get_chapter(&self, id: &str) -> StoreResult<Option<Chapter>> {
        Ok(self.chapters.get(id).cloned())
    }

    fn put_chapter(&mut self, chapter: &Chapter) -> StoreResult<()> {
        self.chapters.insert(chapter.id.clone(), chapter.clone());
        Ok(())
    }

    fn delete_chapter(&mut self, id: &str) -> StoreResult<bool> {
        if self.chapters.remove(id).is_none() {
            return Ok(false);
        }
        for m in self.materials.values_mut() {
            if m.chapter_id.as_deref() == Some(id) {
                m.chapter_id = None;
            }
        }
        Ok(true)
    }

    fn list_schedule(&self) -> StoreResult<Vec<ScheduleEntry>> {
        let mut out: Vec<ScheduleEntry> = self.schedule.values().cloned().collect();
        sort_entries(&mut out);
        Ok(out)
    }

    fn get_schedule_entry(&self, id: &str) -> StoreResult<Option<ScheduleEntry>> {
        Ok(self.schedule.get(id).cloned())
    }

    fn put_schedule_entry(&mut self, entry: &ScheduleEntry) -> StoreResult<()> {
        self.schedule.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn delete_schedule_entry(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.schedule.remove(id).is_some())
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let mut out: Vec<Course> = self.courses.values().cloned().collect();
        sort_courses(&mut out);
        Ok(out)
    }

    fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self.courses.get(id).cloned())
    }

    fn put_course(&mut self, course: &Course) -> StoreResult<()> {
        self.courses.insert(course.id.clone(), course.clone());
        Ok(())
    }

    fn delete_course(&mut self, id: &str) -> StoreResult<bool> {
        if self.courses.remove(id).is_none() {
            return Ok(false);
        }
        self.materials.retain(|_, m| m.course_id != id);
        Ok(true)
    }

    fn list_materials(&self) -> StoreResult<Vec<Material>> {
        Ok(self.materials.values().cloned().collect())
    }

    fn get_material(&self, id: &str) -> StoreResult<Option<Material>> {
        Ok(self.materials.get(id).cloned())
    }

    fn put_material(&mut self, material: &Material) -> StoreResult<()> {
        self.materials.insert(material.id.clone(), material.clone());
        Ok(())
    }

    fn delete_material(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.materials.remove(id).is_some())
    }

    fn get_comments(&self, student_id: &str, term: &str) -> StoreResult<Option<BulletinComments>> {
        Ok(self
            .comments
            .get(&(student_id.to_string(), term.to_string()))
            .cloned())
    }

    fn put_comments(&mut self, comments: &BulletinComments) -> StoreResult<()> {
        self.comments.insert(
            (comments.student_id.clone(), comments.term.clone()),
            comments.clone(),
        );
        Ok(())
    }

    fn settings_get_json(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.settings.get(key).cloned())
    }

    fn settings_set_json(&mut self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        self.settings.insert(key.to_string(), value.clone());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_satisfies_contract() {
        let mut store = MemoryStore::new();
        contract::exercise(&mut store);
        assert_eq!(store.kind(), "memory");
    }
}
