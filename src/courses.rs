use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::filters::Filterable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    #[default]
    Active,
    Inactive,
}

impl CourseStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Actif",
            Self::Inactive => "Inactif",
        }
    }
}

/// A subject taught to one or more classes, usually by one professor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub description: String,
    pub level: String,
    pub classes: Vec<String>,
    pub professor_id: Option<String>,
    pub status: CourseStatus,
}

impl Course {
    pub fn is_active(&self) -> bool {
        self.status == CourseStatus::Active
    }

    pub fn taught_to(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c == class_name)
    }
}

impl Filterable for Course {
    fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(String::as_str).collect()
    }

    fn subjects(&self) -> Vec<&str> {
        vec![self.subject.as_str()]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.description.as_str(),
            self.level.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Pdf,
    Ppt,
    Doc,
    Other,
}

impl MaterialKind {
    /// Guessed from the file extension.
    pub fn from_file_name(name: &str) -> Self {
        let ext = Path::new(name.trim())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("ppt" | "pptx" | "odp") => Self::Ppt,
            Some("doc" | "docx" | "odt" | "rtf") => Self::Doc,
            _ => Self::Other,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pdf" => Some(Self::Pdf),
            "ppt" => Some(Self::Ppt),
            "doc" => Some(Self::Doc),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Ppt => "ppt",
            Self::Doc => "doc",
            Self::Other => "other",
        }
    }
}

/// A document shared on a course. Only metadata lives here; the file
/// itself stays wherever the desktop shell put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub course_id: String,
    pub chapter_id: Option<String>,
    pub name: String,
    pub kind: MaterialKind,
    pub size_bytes: u64,
    pub description: String,
    pub published_on: NaiveDate,
    pub owner_id: Option<String>,
}

impl Filterable for Material {
    fn search_text(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.description.as_str()]
    }

    fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.published_on, self.published_on))
    }
}

/// Human-readable size, e.g. `2.4 MB`.
pub fn size_label(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaterialOrder {
    #[default]
    Recent,
    Oldest,
}

impl MaterialOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "recent" => Some(Self::Recent),
            "oldest" => Some(Self::Oldest),
            _ => None,
        }
    }
}

pub fn sort_courses(courses: &mut [Course]) {
    courses.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

/// Publication date in the requested direction; ties break on name then id.
pub fn sort_materials(materials: &mut [Material], order: MaterialOrder) {
    materials.sort_by(|a, b| {
        let by_date = match order {
            MaterialOrder::Recent => b.published_on.cmp(&a.published_on),
            MaterialOrder::Oldest => a.published_on.cmp(&b.published_on),
        };
        by_date
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}
