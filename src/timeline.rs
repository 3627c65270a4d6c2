use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calc::round_2_decimals;
use crate::filters::Filterable;

/// Completed chapters finishing at most this many days late are a slight delay.
pub const SLIGHT_DELAY_MAX_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChapterStatus {
    Planned,
    InProgress,
    Completed,
}

impl ChapterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("chapter is {}; only planned chapters can be started", .0.as_str())]
    CannotStart(ChapterStatus),
    #[error("chapter is {}; only in-progress chapters can be completed", .0.as_str())]
    CannotComplete(ChapterStatus),
    #[error("end date {end} is before the actual start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub subject: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub planned_start_date: NaiveDate,
    pub planned_end_date: NaiveDate,
    pub actual_start_date: Option<NaiveDate>,
    pub actual_end_date: Option<NaiveDate>,
    pub status: ChapterStatus,
    pub materials: u32,
    pub owner_id: Option<String>,
}

impl Chapter {
    /// `planned -> in-progress`, stamping the actual start date.
    pub fn start(&mut self, today: NaiveDate) -> Result<(), TransitionError> {
        if self.status != ChapterStatus::Planned {
            return Err(TransitionError::CannotStart(self.status));
        }
        self.status = ChapterStatus::InProgress;
        self.actual_start_date = Some(today);
        Ok(())
    }

    /// `in-progress -> completed`, stamping the actual end date.
    pub fn complete(&mut self, today: NaiveDate) -> Result<(), TransitionError> {
        if self.status != ChapterStatus::InProgress {
            return Err(TransitionError::CannotComplete(self.status));
        }
        if let Some(start) = self.actual_start_date.filter(|start| today < *start) {
            return Err(TransitionError::EndBeforeStart { start, end: today });
        }
        self.status = ChapterStatus::Completed;
        self.actual_end_date = Some(today);
        Ok(())
    }

    pub fn finished_on_time(&self) -> bool {
        match (self.status, self.actual_end_date) {
            (ChapterStatus::Completed, Some(end)) => end <= self.planned_end_date,
            _ => false,
        }
    }
}

impl Filterable for Chapter {
    fn class_names(&self) -> Vec<&str> {
        vec![self.class_name.as_str()]
    }

    fn subjects(&self) -> Vec<&str> {
        vec![self.subject.as_str()]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.description.as_str()]
    }

    fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.planned_start_date, self.planned_end_date))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineStatus {
    OnTime,
    SlightDelay,
    Delayed,
    Overdue,
    OnTrack,
}

impl TimelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnTime => "on-time",
            Self::SlightDelay => "slight-delay",
            Self::Delayed => "delayed",
            Self::Overdue => "overdue",
            Self::OnTrack => "on-track",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OnTime => "À temps",
            Self::SlightDelay => "Léger retard",
            Self::Delayed => "En retard",
            Self::Overdue => "Dépassé",
            Self::OnTrack => "En cours",
        }
    }
}

pub fn classify_completion(planned_end: NaiveDate, actual_end: NaiveDate) -> TimelineStatus {
    let diff_days = (actual_end - planned_end).num_days();
    if diff_days <= 0 {
        TimelineStatus::OnTime
    } else if diff_days <= SLIGHT_DELAY_MAX_DAYS {
        TimelineStatus::SlightDelay
    } else {
        TimelineStatus::Delayed
    }
}

/// Planned chapters are not classified.
pub fn classify(chapter: &Chapter, today: NaiveDate) -> Option<TimelineStatus> {
    match chapter.status {
        ChapterStatus::Planned => None,
        ChapterStatus::Completed => Some(match chapter.actual_end_date {
            Some(end) => classify_completion(chapter.planned_end_date, end),
            None => TimelineStatus::OnTrack,
        }),
        ChapterStatus::InProgress if today > chapter.planned_end_date => {
            Some(TimelineStatus::Overdue)
        }
        ChapterStatus::InProgress => Some(TimelineStatus::OnTrack),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total: usize,
    pub planned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub completion_percent: f64,
    pub timeline_adherence_percent: f64,
}

pub fn progress<'a, I>(chapters: I) -> ProgressSummary
where
    I: IntoIterator<Item = &'a Chapter>,
{
    let mut total = 0usize;
    let mut planned = 0usize;
    let mut in_progress = 0usize;
    let mut completed = 0usize;
    let mut completed_dated = 0usize;
    let mut on_time = 0usize;
    for ch in chapters {
        total += 1;
        match ch.status {
            ChapterStatus::Planned => planned += 1,
            ChapterStatus::InProgress => in_progress += 1,
            ChapterStatus::Completed => {
                completed += 1;
                if ch.actual_end_date.is_some() {
                    completed_dated += 1;
                }
                if ch.finished_on_time() {
                    on_time += 1;
                }
            }
        }
    }
    ProgressSummary {
        total,
        planned,
        in_progress,
        completed,
        completion_percent: percent(completed, total, 0.0),
        timeline_adherence_percent: percent(on_time, completed_dated, 100.0),
    }
}

fn percent(part: usize, whole: usize, empty: f64) -> f64 {
    if whole == 0 {
        return empty;
    }
    round_2_decimals(100.0 * part as f64 / whole as f64)
}
