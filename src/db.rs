use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::calc::{AttendanceRecord, AttendanceStatus, GradeRecord};
use crate::courses::{sort_courses, Course, CourseStatus, Material, MaterialKind};
use crate::schedule::{sort_entries, Day, ScheduleEntry, TimeSlot};
use crate::session::{Role, User};
use crate::store::{
    sort_chapters, BulletinComments, SessionKey, SheetKey, Store, StoreError, StoreResult, Student,
};
use crate::timeline::{Chapter, ChapterStatus};

pub const DB_FILE_NAME: &str = "schoold.sqlite3";
const DATE_FMT: &str = "%Y-%m-%d";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            active INTEGER NOT NULL,
            student_id TEXT,
            classes_json TEXT NOT NULL DEFAULT '[]',
            subjects_json TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email COLLATE NOCASE)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            class_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            subject TEXT NOT NULL,
            term TEXT NOT NULL,
            student_id TEXT NOT NULL,
            homework1 REAL,
            homework2 REAL,
            exam REAL,
            PRIMARY KEY(subject, term, student_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            class_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            date TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            PRIMARY KEY(class_name, subject, date, student_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chapters(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            subject TEXT NOT NULL,
            class_name TEXT NOT NULL,
            planned_start_date TEXT NOT NULL,
            planned_end_date TEXT NOT NULL,
            actual_start_date TEXT,
            actual_end_date TEXT,
            status TEXT NOT NULL,
            materials INTEGER NOT NULL DEFAULT 0,
            owner_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chapters_class ON chapters(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bulletin_comments(
            student_id TEXT NOT NULL,
            term TEXT NOT NULL,
            teacher_comment TEXT NOT NULL DEFAULT '',
            principal_comment TEXT NOT NULL DEFAULT '',
            PRIMARY KEY(student_id, term),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule(
            id TEXT PRIMARY KEY,
            day TEXT NOT NULL,
            slot TEXT NOT NULL,
            class_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            teacher_id TEXT,
            room TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(teacher_id) REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_class ON schedule(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            level TEXT NOT NULL DEFAULT '',
            classes_json TEXT NOT NULL DEFAULT '[]',
            professor_id TEXT,
            status TEXT NOT NULL,
            FOREIGN KEY(professor_id) REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS materials(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            chapter_id TEXT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            published_on TEXT NOT NULL,
            owner_id TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY(chapter_id) REFERENCES chapters(id) ON DELETE SET NULL,
            FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_course ON materials(course_id)",
        [],
    )?;

    Ok(())
}

fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn parse_date(s: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|e| StoreError::Corrupt(format!("bad date {:?}: {}", s, e)))
}

fn parse_opt_date(s: Option<String>) -> StoreResult<Option<NaiveDate>> {
    s.as_deref().map(parse_date).transpose()
}

/// Raw user row; classes/subjects are JSON text columns.
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    active: i64,
    student_id: Option<String>,
    classes_json: String,
    subjects_json: String,
}

impl UserRow {
    const COLUMNS: &'static str =
        "id, name, email, role, active, student_id, classes_json, subjects_json";

    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            email: r.get(2)?,
            role: r.get(3)?,
            active: r.get(4)?,
            student_id: r.get(5)?,
            classes_json: r.get(6)?,
            subjects_json: r.get(7)?,
        })
    }

    fn into_user(self) -> StoreResult<User> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role {:?}", self.role)))?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            active: self.active != 0,
            student_id: self.student_id,
            classes: serde_json::from_str(&self.classes_json)?,
            subjects: serde_json::from_str(&self.subjects_json)?,
        })
    }
}

struct ChapterRow {
    id: String,
    title: String,
    description: String,
    subject: String,
    class_name: String,
    planned_start_date: String,
    planned_end_date: String,
    actual_start_date: Option<String>,
    actual_end_date: Option<String>,
    status: String,
    materials: i64,
    owner_id: Option<String>,
}

impl ChapterRow {
    const COLUMNS: &'static str = "id, title, description, subject, class_name,
        planned_start_date, planned_end_date, actual_start_date, actual_end_date,
        status, materials, owner_id";

    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            title: r.get(1)?,
            description: r.get(2)?,
            subject: r.get(3)?,
            class_name: r.get(4)?,
            planned_start_date: r.get(5)?,
            planned_end_date: r.get(6)?,
            actual_start_date: r.get(7)?,
            actual_end_date: r.get(8)?,
            status: r.get(9)?,
            materials: r.get(10)?,
            owner_id: r.get(11)?,
        })
    }

    fn into_chapter(self) -> StoreResult<Chapter> {
        let status = ChapterStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown chapter status {:?}", self.status)))?;
        let materials = u32::try_from(self.materials).map_err(|_| {
            StoreError::Corrupt(format!("bad material count {} on chapter {}", self.materials, self.id))
        })?;
        Ok(Chapter {
            id: self.id,
            title: self.title,
            description: self.description,
            subject: self.subject,
            class_name: self.class_name,
            planned_start_date: parse_date(&self.planned_start_date)?,
            planned_end_date: parse_date(&self.planned_end_date)?,
            actual_start_date: parse_opt_date(self.actual_start_date)?,
            actual_end_date: parse_opt_date(self.actual_end_date)?,
            status,
            materials,
            owner_id: self.owner_id,
        })
    }
}

struct ScheduleRow {
    id: String,
    day: String,
    slot: String,
    class_name: String,
    subject: String,
    teacher_id: Option<String>,
    room: String,
}

impl ScheduleRow {
    const COLUMNS: &'static str = "id, day, slot, class_name, subject, teacher_id, room";

    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            day: r.get(1)?,
            slot: r.get(2)?,
            class_name: r.get(3)?,
            subject: r.get(4)?,
            teacher_id: r.get(5)?,
            room: r.get(6)?,
        })
    }

    fn into_entry(self) -> StoreResult<ScheduleEntry> {
        let day = Day::parse(&self.day)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown day {:?}", self.day)))?;
        let slot = TimeSlot::parse(&self.slot).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(ScheduleEntry {
            id: self.id,
            day,
            slot,
            class_name: self.class_name,
            subject: self.subject,
            teacher_id: self.teacher_id,
            room: self.room,
        })
    }
}

/// Raw course row; classes are a JSON text column.
struct CourseRow {
    id: String,
    name: String,
    subject: String,
    description: String,
    level: String,
    classes_json: String,
    professor_id: Option<String>,
    status: String,
}

impl CourseRow {
    const COLUMNS: &'static str =
        "id, name, subject, description, level, classes_json, professor_id, status";

    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            subject: r.get(2)?,
            description: r.get(3)?,
            level: r.get(4)?,
            classes_json: r.get(5)?,
            professor_id: r.get(6)?,
            status: r.get(7)?,
        })
    }

    fn into_course(self) -> StoreResult<Course> {
        let status = CourseStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown course status {:?}", self.status)))?;
        Ok(Course {
            id: self.id,
            name: self.name,
            subject: self.subject,
            description: self.description,
            level: self.level,
            classes: serde_json::from_str(&self.classes_json)?,
            professor_id: self.professor_id,
            status,
        })
    }
}

struct MaterialRow {
    id: String,
    course_id: String,
    chapter_id: Option<String>,
    name: String,
    kind: String,
    size_bytes: i64,
    description: String,
    published_on: String,
    owner_id: Option<String>,
}

impl MaterialRow {
    const COLUMNS: &'static str = "id, course_id, chapter_id, name, kind, size_bytes,
        description, published_on, owner_id";

    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            course_id: r.get(1)?,
            chapter_id: r.get(2)?,
            name: r.get(3)?,
            kind: r.get(4)?,
            size_bytes: r.get(5)?,
            description: r.get(6)?,
            published_on: r.get(7)?,
            owner_id: r.get(8)?,
        })
    }

    fn into_material(self) -> StoreResult<Material> {
        let kind = MaterialKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown material kind {:?}", self.kind)))?;
        let size_bytes = u64::try_from(self.size_bytes).map_err(|_| {
            StoreError::Corrupt(format!("bad size {} on material {}", self.size_bytes, self.id))
        })?;
        Ok(Material {
            id: self.id,
            course_id: self.course_id,
            chapter_id: self.chapter_id,
            name: self.name,
            kind,
            size_bytes,
            description: self.description,
            published_on: parse_date(&self.published_on)?,
            owner_id: self.owner_id,
        })
    }
}

fn read_grade(r: &Row<'_>, offset: usize) -> rusqlite::Result<GradeRecord> {
    Ok(GradeRecord {
        student_id: r.get(offset)?,
        homework1: r.get(offset + 1)?,
        homework2: r.get(offset + 2)?,
        exam: r.get(offset + 3)?,
    })
}

fn attendance_record(student_id: String, status: &str, comment: String) -> StoreResult<AttendanceRecord> {
    let status = AttendanceStatus::from_code(status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown attendance status {:?}", status)))?;
    Ok(AttendanceRecord {
        student_id,
        status,
        comment,
    })
}

/// Workspace-backed store over `schoold.sqlite3`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Store for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY name, id", UserRow::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], UserRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", UserRow::COLUMNS);
        self.conn
            .query_row(&sql, [id], UserRow::read)
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = ? COLLATE NOCASE ORDER BY id LIMIT 1",
            UserRow::COLUMNS
        );
        self.conn
            .query_row(&sql, [email.trim()], UserRow::read)
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    fn put_user(&mut self, user: &User) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO users(id, name, email, role, active, student_id, classes_json, subjects_json)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               email = excluded.email,
               role = excluded.role,
               active = excluded.active,
               student_id = excluded.student_id,
               classes_json = excluded.classes_json,
               subjects_json = excluded.subjects_json",
            params![
                user.id,
                user.name,
                user.email,
                user.role.as_str(),
                user.active as i64,
                user.student_id,
                serde_json::to_string(&user.classes)?,
                serde_json::to_string(&user.subjects)?,
            ],
        )?;
        Ok(())
    }

    fn delete_user(&mut self, id: &str) -> StoreResult<bool> {
        // schedule, course and material references are set to NULL
        Ok(self.conn.execute("DELETE FROM users WHERE id = ?", [id])? > 0)
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, class_name
             FROM students
             ORDER BY class_name, display_name, id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    display_name: r.get(1)?,
                    class_name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_student(&self, id: &str) -> StoreResult<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, display_name, class_name FROM students WHERE id = ?",
                [id],
                |r| {
                    Ok(Student {
                        id: r.get(0)?,
                        display_name: r.get(1)?,
                        class_name: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn put_student(&mut self, student: &Student) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO students(id, display_name, class_name) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               display_name = excluded.display_name,
               class_name = excluded.class_name",
            params![student.id, student.display_name, student.class_name],
        )?;
        Ok(())
    }

    fn delete_student(&mut self, id: &str) -> StoreResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE users SET student_id = NULL WHERE student_id = ?", [id])?;
        // grades, attendance and bulletin comments cascade
        let n = tx.execute("DELETE FROM students WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(n > 0)
    }

    fn sheet_grades(&self, key: &SheetKey) -> StoreResult<Vec<GradeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, homework1, homework2, exam
             FROM grades
             WHERE subject = ? AND term = ?
             ORDER BY student_id",
        )?;
        let rows = stmt
            .query_map((&key.subject, &key.term), |r| read_grade(r, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn all_grades(&self) -> StoreResult<Vec<(SheetKey, GradeRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject, term, student_id, homework1, homework2, exam
             FROM grades
             ORDER BY subject, term, student_id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                let key = SheetKey {
                    subject: r.get(0)?,
                    term: r.get(1)?,
                };
                Ok((key, read_grade(r, 2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn student_grades(&self, student_id: &str) -> StoreResult<Vec<(SheetKey, GradeRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject, term, student_id, homework1, homework2, exam
             FROM grades
             WHERE student_id = ?
             ORDER BY subject, term",
        )?;
        let rows = stmt
            .query_map([student_id], |r| {
                let key = SheetKey {
                    subject: r.get(0)?,
                    term: r.get(1)?,
                };
                Ok((key, read_grade(r, 2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn put_grade(&mut self, key: &SheetKey, record: &GradeRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO grades(subject, term, student_id, homework1, homework2, exam)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(subject, term, student_id) DO UPDATE SET
               homework1 = excluded.homework1,
               homework2 = excluded.homework2,
               exam = excluded.exam",
            params![
                key.subject,
                key.term,
                record.student_id,
                record.homework1,
                record.homework2,
                record.exam,
            ],
        )?;
        Ok(())
    }

    fn session_attendance(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, status, comment
             FROM attendance
             WHERE class_name = ? AND subject = ? AND date = ?
             ORDER BY student_id",
        )?;
        let rows = stmt
            .query_map(
                (&key.class_name, &key.subject, format_date(key.date)),
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(sid, status, comment)| attendance_record(sid, &status, comment))
            .collect()
    }

    fn all_attendance(&self) -> StoreResult<Vec<(SessionKey, AttendanceRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT class_name, subject, date, student_id, status, comment
             FROM attendance
             ORDER BY date, class_name, subject, student_id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(class_name, subject, date, sid, status, comment)| {
                let key = SessionKey {
                    class_name,
                    subject,
                    date: parse_date(&date)?,
                };
                Ok((key, attendance_record(sid, &status, comment)?))
            })
            .collect()
    }

    fn put_attendance(&mut self, key: &SessionKey, record: &AttendanceRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO attendance(class_name, subject, date, student_id, status, comment)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_name, subject, date, student_id) DO UPDATE SET
               status = excluded.status,
               comment = excluded.comment",
            params![
                key.class_name,
                key.subject,
                format_date(key.date),
                record.student_id,
                record.status.code(),
                record.comment,
            ],
        )?;
        Ok(())
    }

    fn list_chapters(&self) -> StoreResult<Vec<Chapter>> {
        let sql = format!("SELECT {} FROM chapters", ChapterRow::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ChapterRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = rows
            .into_iter()
            .map(ChapterRow::into_chapter)
            .collect::<StoreResult<Vec<_>>>()?;
        sort_chapters(&mut out);
        Ok(out)
    }

    fn get_chapter(&self, id: &str) -> StoreResult<Option<Chapter>> {
        let sql = format!("SELECT {} FROM chapters WHERE id = ?", ChapterRow::COLUMNS);
        self.conn
            .query_row(&sql, [id], ChapterRow::read)
            .optional()?
            .map(ChapterRow::into_chapter)
            .transpose()
    }

    fn put_chapter(&mut self, ch: &Chapter) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO chapters(id, title, description, subject, class_name,
                planned_start_date, planned_end_date, actual_start_date, actual_end_date,
                status, materials, owner_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               description = excluded.description,
               subject = excluded.subject,
               class_name = excluded.class_name,
               planned_start_date = excluded.planned_start_date,
               planned_end_date = excluded.planned_end_date,
               actual_start_date = excluded.actual_start_date,
               actual_end_date = excluded.actual_end_date,
               status = excluded.status,
               materials = excluded.materials,
               owner_id = excluded.owner_id",
            params![
                ch.id,
                ch.title,
                ch.description,
                ch.subject,
                ch.class_name,
                format_date(ch.planned_start_date),
                format_date(ch.planned_end_date),
                ch.actual_start_date.map(format_date),
                ch.actual_end_date.map(format_date),
                ch.status.as_str(),
                ch.materials as i64,
                ch.owner_id,
            ],
        )?;
        Ok(())
    }

    fn delete_chapter(&mut self, id: &str) -> StoreResult<bool> {
        // materials keep their course and lose the chapter link
        Ok(self.conn.execute("DELETE FROM chapters WHERE id = ?", [id])? > 0)
    }

    fn list_schedule(&self) -> StoreResult<Vec<ScheduleEntry>> {
        let sql = format!("SELECT {} FROM schedule", ScheduleRow::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ScheduleRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = rows
            .into_iter()
            .map(ScheduleRow::into_entry)
            .collect::<StoreResult<Vec<_>>>()?;
        sort_entries(&mut out);
        Ok(out)
    }

    fn get_schedule_entry(&self, id: &str) -> StoreResult<Option<ScheduleEntry>> {
        let sql = format!("SELECT {} FROM schedule WHERE id = ?", ScheduleRow::COLUMNS);
        self.conn
            .query_row(&sql, [id], ScheduleRow::read)
            .optional()?
            .map(ScheduleRow::into_entry)
            .transpose()
    }

    fn put_schedule_entry(&mut self, e: &ScheduleEntry) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO schedule(id, day, slot, class_name, subject, teacher_id, room)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               day = excluded.day,
               slot = excluded.slot,
               class_name = excluded.class_name,
               subject = excluded.subject,
               teacher_id = excluded.teacher_id,
               room = excluded.room",
            params![
                e.id,
                e.day.as_str(),
                e.slot.to_string(),
                e.class_name,
                e.subject,
                e.teacher_id,
                e.room,
            ],
        )?;
        Ok(())
    }

    fn delete_schedule_entry(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM schedule WHERE id = ?", [id])? > 0)
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let sql = format!("SELECT {} FROM courses", CourseRow::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], CourseRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = rows
            .into_iter()
            .map(CourseRow::into_course)
            .collect::<StoreResult<Vec<_>>>()?;
        sort_courses(&mut out);
        Ok(out)
    }

    fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", CourseRow::COLUMNS);
        self.conn
            .query_row(&sql, [id], CourseRow::read)
            .optional()?
            .map(CourseRow::into_course)
            .transpose()
    }

    fn put_course(&mut self, c: &Course) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO courses(id, name, subject, description, level, classes_json,
                professor_id, status)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               subject = excluded.subject,
               description = excluded.description,
               level = excluded.level,
               classes_json = excluded.classes_json,
               professor_id = excluded.professor_id,
               status = excluded.status",
            params![
                c.id,
                c.name,
                c.subject,
                c.description,
                c.level,
                serde_json::to_string(&c.classes)?,
                c.professor_id,
                c.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn delete_course(&mut self, id: &str) -> StoreResult<bool> {
        // materials cascade
        Ok(self.conn.execute("DELETE FROM courses WHERE id = ?", [id])? > 0)
    }

    fn list_materials(&self) -> StoreResult<Vec<Material>> {
        let sql = format!("SELECT {} FROM materials ORDER BY id", MaterialRow::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], MaterialRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MaterialRow::into_material).collect()
    }

    fn get_material(&self, id: &str) -> StoreResult<Option<Material>> {
        let sql = format!("SELECT {} FROM materials WHERE id = ?", MaterialRow::COLUMNS);
        self.conn
            .query_row(&sql, [id], MaterialRow::read)
            .optional()?
            .map(MaterialRow::into_material)
            .transpose()
    }

    fn put_material(&mut self, m: &Material) -> StoreResult<()> {
        let size = i64::try_from(m.size_bytes)
            .map_err(|_| StoreError::Corrupt(format!("material {} is too large", m.id)))?;
        self.conn.execute(
            "INSERT INTO materials(id, course_id, chapter_id, name, kind, size_bytes,
                description, published_on, owner_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               course_id = excluded.course_id,
               chapter_id = excluded.chapter_id,
               name = excluded.name,
               kind = excluded.kind,
               size_bytes = excluded.size_bytes,
               description = excluded.description,
               published_on = excluded.published_on,
               owner_id = excluded.owner_id",
            params![
                m.id,
                m.course_id,
                m.chapter_id,
                m.name,
                m.kind.as_str(),
                size,
                m.description,
                format_date(m.published_on),
                m.owner_id,
            ],
        )?;
        Ok(())
    }

    fn delete_material(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM materials WHERE id = ?", [id])? > 0)
    }

    fn get_comments(&self, student_id: &str, term: &str) -> StoreResult<Option<BulletinComments>> {
        Ok(self
            .conn
            .query_row(
                "SELECT student_id, term, teacher_comment, principal_comment
                 FROM bulletin_comments
                 WHERE student_id = ? AND term = ?",
                (student_id, term),
                |r| {
                    Ok(BulletinComments {
                        student_id: r.get(0)?,
                        term: r.get(1)?,
                        teacher_comment: r.get(2)?,
                        principal_comment: r.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    fn put_comments(&mut self, c: &BulletinComments) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO bulletin_comments(student_id, term, teacher_comment, principal_comment)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(student_id, term) DO UPDATE SET
               teacher_comment = excluded.teacher_comment,
               principal_comment = excluded.principal_comment",
            params![c.student_id, c.term, c.teacher_comment, c.principal_comment],
        )?;
        Ok(())
    }

    fn settings_get_json(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?",
                [key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    fn settings_set_json(&mut self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO settings(key, value_json) VALUES(?, ?)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
            (key, serde_json::to_string(value)?),
        )?;
        Ok(())
    }
}
