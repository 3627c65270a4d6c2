use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::filters::Filterable;

/// School days of the weekly timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
    ];

    /// Accepts the wire code or the French label, in any case.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s || d.label().to_lowercase() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Monday => "Lundi",
            Self::Tuesday => "Mardi",
            Self::Wednesday => "Mercredi",
            Self::Thursday => "Jeudi",
            Self::Friday => "Vendredi",
        }
    }

    /// `None` on weekends.
    pub fn of(date: NaiveDate) -> Option<Self> {
        match date.weekday() {
            Weekday::Mon => Some(Self::Monday),
            Weekday::Tue => Some(Self::Tuesday),
            Weekday::Wed => Some(Self::Wednesday),
            Weekday::Thu => Some(Self::Thursday),
            Weekday::Fri => Some(Self::Friday),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("time slot {0:?} must look like 08:00-09:00")]
    Format(String),
    #[error("time slot {0:?} must end after it starts")]
    Inverted(String),
}

/// Half-open time range `[start, end)` within a school day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    pub fn parse(raw: &str) -> Result<Self, SlotError> {
        let format_err = || SlotError::Format(raw.to_string());
        let (start, end) = raw.trim().split_once('-').ok_or_else(format_err)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| format_err())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| format_err())?;
        if end <= start {
            return Err(SlotError::Inverted(raw.to_string()));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = SlotError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

/// One weekly session: a class taking a subject with a teacher in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub day: Day,
    pub slot: TimeSlot,
    #[serde(rename = "class")]
    pub class_name: String,
    pub subject: String,
    pub teacher_id: Option<String>,
    pub room: String,
}

impl Filterable for ScheduleEntry {
    fn class_names(&self) -> Vec<&str> {
        vec![self.class_name.as_str()]
    }

    fn subjects(&self) -> Vec<&str> {
        vec![self.subject.as_str()]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![
            self.subject.as_str(),
            self.class_name.as_str(),
            self.room.as_str(),
        ]
    }
}

/// Two sessions at overlapping times that cannot both happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleConflict {
    #[error("the class already has a session at that time")]
    Class(String),
    #[error("the teacher already teaches at that time")]
    Teacher(String),
    #[error("the room is already in use at that time")]
    Room(String),
}

impl ScheduleConflict {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::Teacher(_) => "teacher",
            Self::Room(_) => "room",
        }
    }

    /// Id of the entry already holding the slot.
    pub fn entry_id(&self) -> &str {
        match self {
            Self::Class(id) | Self::Teacher(id) | Self::Room(id) => id,
        }
    }
}

fn same_room(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// First clash between `entry` and the other stored entries. An entry never
/// clashes with the stored version of itself.
pub fn find_conflict(entry: &ScheduleEntry, existing: &[ScheduleEntry]) -> Option<ScheduleConflict> {
    existing
        .iter()
        .filter(|other| other.id != entry.id && other.day == entry.day)
        .filter(|other| other.slot.overlaps(&entry.slot))
        .find_map(|other| {
            if other.class_name == entry.class_name {
                Some(ScheduleConflict::Class(other.id.clone()))
            } else if entry.teacher_id.is_some() && other.teacher_id == entry.teacher_id {
                Some(ScheduleConflict::Teacher(other.id.clone()))
            } else if same_room(&other.room, &entry.room) {
                Some(ScheduleConflict::Room(other.id.clone()))
            } else {
                None
            }
        })
}

pub fn sort_entries(entries: &mut [ScheduleEntry]) {
    entries.sort_by(|a, b| {
        a.day
            .cmp(&b.day)
            .then_with(|| a.slot.cmp(&b.slot))
            .then_with(|| a.class_name.cmp(&b.class_name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// A teacher's week at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyLoad {
    pub sessions: usize,
    pub total_hours: f64,
    pub class_count: usize,
}

pub fn weekly_load(entries: &[ScheduleEntry]) -> WeeklyLoad {
    let minutes: i64 = entries.iter().map(|e| e.slot.minutes()).sum();
    let classes: BTreeSet<&str> = entries.iter().map(|e| e.class_name.as_str()).collect();
    WeeklyLoad {
        sessions: entries.len(),
        total_hours: (minutes as f64 / 60.0 * 100.0).round() / 100.0,
        class_count: classes.len(),
    }
}

/// Earliest session on or after `from`, looking one week ahead.
pub fn next_session<'a>(
    entries: &[&'a ScheduleEntry],
    from: NaiveDate,
) -> Option<(NaiveDate, &'a ScheduleEntry)> {
    (0..7).find_map(|offset| {
        let date = from + Duration::days(offset);
        let day = Day::of(date)?;
        entries
            .iter()
            .copied()
            .filter(|e| e.day == day)
            .min_by_key(|e| e.slot)
            .map(|e| (date, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn entry(id: &str, day: Day, slot: &str, class: &str, teacher: Option<&str>, room: &str) -> ScheduleEntry {
        ScheduleEntry {
            id: id.to_string(),
            day,
            slot: TimeSlot::parse(slot).expect("slot"),
            class_name: class.to_string(),
            subject: "Mathématiques".to_string(),
            teacher_id: teacher.map(str::to_string),
            room: room.to_string(),
        }
    }

    #[test]
    fn days_parse_codes_and_french_labels() {
        assert_eq!(Day::parse("Lundi"), Some(Day::Monday));
        assert_eq!(Day::parse(" friday "), Some(Day::Friday));
        assert_eq!(Day::parse("samedi"), None);
        assert_eq!(Day::of(d("2024-01-22")), Some(Day::Monday));
        assert_eq!(Day::of(d("2024-01-27")), None);
    }

    #[test]
    fn slots_parse_and_round_trip_through_serde() {
        let slot = TimeSlot::parse("08:00-09:30").expect("slot");
        assert_eq!(slot.minutes(), 90);
        assert_eq!(serde_json::to_value(slot).expect("json"), serde_json::json!("08:00-09:30"));
        let back: TimeSlot = serde_json::from_value(serde_json::json!("08:00-09:30")).expect("parse");
        assert_eq!(back, slot);

        assert!(matches!(TimeSlot::parse("8h-9h"), Err(SlotError::Format(_))));
        assert!(matches!(TimeSlot::parse("10:00-09:00"), Err(SlotError::Inverted(_))));
        assert!(matches!(TimeSlot::parse("10:00-10:00"), Err(SlotError::Inverted(_))));
    }

    #[test]
    fn back_to_back_slots_do_not_overlap() {
        let a = TimeSlot::parse("08:00-09:00").expect("slot");
        let b = TimeSlot::parse("09:00-10:00").expect("slot");
        let c = TimeSlot::parse("08:30-09:30").expect("slot");
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c) && c.overlaps(&b));
    }

    #[test]
    fn conflicts_cover_class_teacher_and_room() {
        let existing = vec![entry("e1", Day::Monday, "08:00-09:00", "6ème A", Some("t1"), "Salle 101")];

        let same_class = entry("n", Day::Monday, "08:30-09:30", "6ème A", Some("t2"), "Salle 102");
        assert_eq!(
            find_conflict(&same_class, &existing),
            Some(ScheduleConflict::Class("e1".to_string()))
        );
        let same_teacher = entry("n", Day::Monday, "08:00-09:00", "5ème B", Some("t1"), "Salle 102");
        assert_eq!(find_conflict(&same_teacher, &existing).map(|c| c.kind()), Some("teacher"));
        let same_room = entry("n", Day::Monday, "08:00-09:00", "5ème B", None, "salle 101 ");
        assert_eq!(find_conflict(&same_room, &existing).map(|c| c.kind()), Some("room"));

        let other_day = entry("n", Day::Tuesday, "08:00-09:00", "6ème A", Some("t1"), "Salle 101");
        assert_eq!(find_conflict(&other_day, &existing), None);
        let later = entry("n", Day::Monday, "09:00-10:00", "6ème A", Some("t1"), "Salle 101");
        assert_eq!(find_conflict(&later, &existing), None);
        let no_room = entry("n", Day::Monday, "08:00-09:00", "5ème B", None, "");
        let roomless = vec![entry("e2", Day::Monday, "08:00-09:00", "4ème C", None, "")];
        assert_eq!(find_conflict(&no_room, &roomless), None);

        let itself = entry("e1", Day::Monday, "08:00-09:30", "6ème A", Some("t1"), "Salle 101");
        assert_eq!(find_conflict(&itself, &existing), None);
    }

    #[test]
    fn weekly_load_counts_hours_and_distinct_classes() {
        let entries = vec![
            entry("a", Day::Monday, "08:00-09:00", "6ème A", Some("t1"), ""),
            entry("b", Day::Monday, "10:00-11:30", "5ème B", Some("t1"), ""),
            entry("c", Day::Thursday, "14:00-15:00", "6ème A", Some("t1"), ""),
        ];
        let load = weekly_load(&entries);
        assert_eq!(load.sessions, 3);
        assert_eq!(load.total_hours, 3.5);
        assert_eq!(load.class_count, 2);
        assert_eq!(weekly_load(&[]).total_hours, 0.0);
    }

    #[test]
    fn next_session_skips_to_the_following_school_day() {
        let mon = entry("a", Day::Monday, "10:00-11:00", "6ème A", None, "");
        let mon_early = entry("b", Day::Monday, "08:00-09:00", "6ème A", None, "");
        let thu = entry("c", Day::Thursday, "14:00-15:00", "6ème A", None, "");
        let all = vec![&mon, &mon_early, &thu];

        // Monday 2024-01-22
        let (date, first) = next_session(&all, d("2024-01-22")).expect("session");
        assert_eq!((date, first.id.as_str()), (d("2024-01-22"), "b"));
        let (date, first) = next_session(&all, d("2024-01-23")).expect("session");
        assert_eq!((date, first.id.as_str()), (d("2024-01-25"), "c"));
        // Saturday rolls over to Monday
        let (date, _) = next_session(&all, d("2024-01-27")).expect("session");
        assert_eq!(date, d("2024-01-29"));
        assert!(next_session(&[], d("2024-01-22")).is_none());
    }

    #[test]
    fn entries_sort_by_day_then_time() {
        let mut entries = vec![
            entry("c", Day::Tuesday, "08:00-09:00", "6ème A", None, ""),
            entry("b", Day::Monday, "10:00-11:00", "6ème A", None, ""),
            entry("a", Day::Monday, "08:00-09:00", "6ème A", None, ""),
        ];
        sort_entries(&mut entries);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
