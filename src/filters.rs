use chrono::NaiveDate;
use serde::Deserialize;

/// Anything a list view can narrow. Fields an item does not carry return
/// empty values, and any active criterion on such a field rejects the item.
pub trait Filterable {
    fn class_names(&self) -> Vec<&str> {
        Vec::new()
    }

    fn subjects(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Text searched case-insensitively (names, titles, descriptions).
    fn search_text(&self) -> Vec<&str>;

    /// Inclusive date span the item covers.
    fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectMatch {
    #[default]
    Exact,
    Contains,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFilter {
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub subject_match: SubjectMatch,
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn active(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ListFilter {
    pub fn is_empty(&self) -> bool {
        active(&self.class_name).is_none()
            && active(&self.subject).is_none()
            && active(&self.search).is_none()
            && self.from.is_none()
            && self.to.is_none()
    }

    pub fn matches<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        self.matches_class(item)
            && self.matches_subject(item)
            && self.matches_search(item)
            && self.matches_dates(item)
    }

    fn matches_class<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        let Some(class_name) = active(&self.class_name) else {
            return true;
        };
        item.class_names().iter().any(|c| *c == class_name)
    }

    fn matches_subject<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        let Some(subject) = active(&self.subject) else {
            return true;
        };
        item.subjects().iter().any(|s| match self.subject_match {
            SubjectMatch::Exact => *s == subject,
            SubjectMatch::Contains => s.contains(subject),
        })
    }

    fn matches_search<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        let Some(needle) = active(&self.search) else {
            return true;
        };
        let needle = needle.to_lowercase();
        item.search_text()
            .iter()
            .any(|hay| hay.to_lowercase().contains(&needle))
    }

    fn matches_dates<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some((start, end)) = item.date_span() else {
            return false;
        };
        self.from.map_or(true, |from| start >= from) && self.to.map_or(true, |to| end <= to)
    }

    /// Keeps matching items in input order.
    pub fn apply<T: Filterable>(&self, items: Vec<T>) -> Vec<T> {
        if self.is_empty() {
            return items;
        }
        items.into_iter().filter(|it| self.matches(it)).collect()
    }
}
