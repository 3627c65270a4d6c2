use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filters::Filterable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Professor,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    ManageUsers,
    ManageRoster,
    ViewRoster,
    EnterGrades,
    ManageAttendance,
    PlanChapters,
    MonitorChapters,
    ViewChapters,
    ViewSchedule,
    ManageSchedule,
    ViewCourses,
    ManageCourses,
    ShareMaterials,
    ViewReports,
    ViewStatistics,
    ManageSettings,
    ManageBackups,
    ViewOwnRecords,
}

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ManageUsers,
    Capability::ManageRoster,
    Capability::ViewRoster,
    Capability::EnterGrades,
    Capability::ManageAttendance,
    Capability::PlanChapters,
    Capability::MonitorChapters,
    Capability::ViewChapters,
    Capability::ViewSchedule,
    Capability::ManageSchedule,
    Capability::ViewCourses,
    Capability::ManageCourses,
    Capability::ShareMaterials,
    Capability::ViewReports,
    Capability::ViewStatistics,
    Capability::ManageSettings,
    Capability::ManageBackups,
    Capability::ViewOwnRecords,
];

const PROFESSOR_CAPABILITIES: &[Capability] = &[
    Capability::ViewRoster,
    Capability::EnterGrades,
    Capability::ManageAttendance,
    Capability::PlanChapters,
    Capability::ViewChapters,
    Capability::ViewSchedule,
    Capability::ViewCourses,
    Capability::ShareMaterials,
];

const STUDENT_CAPABILITIES: &[Capability] = &[
    Capability::ViewOwnRecords,
    Capability::ViewChapters,
    Capability::ViewSchedule,
    Capability::ViewCourses,
];

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "professor" => Some(Self::Professor),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Professor => "professor",
            Self::Student => "student",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrateur",
            Self::Professor => "Professeur",
            Self::Student => "Étudiant",
        }
    }

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Admin => ADMIN_CAPABILITIES,
            Self::Professor => PROFESSOR_CAPABILITIES,
            Self::Student => STUDENT_CAPABILITIES,
        }
    }

    pub fn allows(self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    /// Roster entry a student account reads its records from.
    pub student_id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl Filterable for User {
    fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(String::as_str).collect()
    }

    fn subjects(&self) -> Vec<&str> {
        self.subjects.iter().map(String::as_str).collect()
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.email.as_str()]
    }
}

/// The signed-in user for this process run. Handlers receive it through
/// `AppState`; it is dropped on logout or when the workspace changes.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub opened_at: DateTime<Utc>,
}

/// Outcome of checking a session against a student-scoped query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentAccess {
    Any,
    Own,
    Denied,
}

impl Session {
    pub fn open(user: User) -> Self {
        Self {
            user,
            opened_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.user.role.allows(cap)
    }

    pub fn student_access(&self, student_id: &str) -> StudentAccess {
        if self.can(Capability::ViewReports) {
            return StudentAccess::Any;
        }
        if self.can(Capability::ViewOwnRecords)
            && self.user.student_id.as_deref() == Some(student_id)
        {
            return StudentAccess::Own;
        }
        StudentAccess::Denied
    }

    /// Admins act on every chapter; professors only on the ones they own.
    pub fn can_edit_chapter(&self, owner_id: Option<&str>) -> bool {
        match self.user.role {
            Role::Admin => true,
            Role::Professor => owner_id == Some(self.user.id.as_str()),
            Role::Student => false,
        }
    }
}
