use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 20.0;
pub const HOMEWORK_WEIGHT: f64 = 0.4;
pub const EXAM_WEIGHT: f64 = 0.6;

/// 2-decimal rounding used for every average shown on a sheet or bulletin.
/// Halves round away from zero.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `(homework1 + homework2) / 2 * 0.4 + exam * 0.6`, rounded to 2 decimals.
pub fn weighted_average(homework1: f64, homework2: f64, exam: f64) -> f64 {
    round_2_decimals((homework1 + homework2) / 2.0 * HOMEWORK_WEIGHT + exam * EXAM_WEIGHT)
}

pub fn is_valid_score(v: f64) -> bool {
    v.is_finite() && (GRADE_MIN..=GRADE_MAX).contains(&v)
}

/// Parses user text into a score. `None` for non-numeric or out-of-range input.
pub fn parse_score(raw: &str) -> Option<f64> {
    let v = raw.trim().replace(',', ".").parse::<f64>().ok()?;
    is_valid_score(v).then_some(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeComponent {
    Homework1,
    Homework2,
    Exam,
}

impl GradeComponent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "homework1" => Some(Self::Homework1),
            "homework2" => Some(Self::Homework2),
            "exam" => Some(Self::Exam),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homework1 => "homework1",
            Self::Homework2 => "homework2",
            Self::Exam => "exam",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub student_id: String,
    pub homework1: Option<f64>,
    pub homework2: Option<f64>,
    pub exam: Option<f64>,
}

impl GradeRecord {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, component: GradeComponent) -> Option<f64> {
        match component {
            GradeComponent::Homework1 => self.homework1,
            GradeComponent::Homework2 => self.homework2,
            GradeComponent::Exam => self.exam,
        }
    }

    /// Stores `value` if it is a valid score. Rejected input leaves the
    /// previous value in place; the return value says whether it was applied.
    pub fn set(&mut self, component: GradeComponent, value: f64) -> bool {
        if !is_valid_score(value) {
            return false;
        }
        let slot = match component {
            GradeComponent::Homework1 => &mut self.homework1,
            GradeComponent::Homework2 => &mut self.homework2,
            GradeComponent::Exam => &mut self.exam,
        };
        *slot = Some(value);
        true
    }

    pub fn set_text(&mut self, component: GradeComponent, raw: &str) -> bool {
        match parse_score(raw) {
            Some(v) => self.set(component, v),
            None => false,
        }
    }

    /// Defined once all three components have been entered.
    pub fn average(&self) -> Option<f64> {
        Some(weighted_average(self.homework1?, self.homework2?, self.exam?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub record_count: usize,
    pub filled_count: usize,
    pub class_average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pass_count: usize,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round_2_decimals(values.iter().sum::<f64>() / values.len() as f64))
}

pub fn sheet_summary(records: &[GradeRecord], pass_mark: f64) -> SheetSummary {
    let averages: Vec<f64> = records.iter().filter_map(GradeRecord::average).collect();
    SheetSummary {
        record_count: records.len(),
        filled_count: averages.len(),
        class_average: mean(&averages),
        min: averages.iter().copied().min_by(|a, b| a.total_cmp(b)),
        max: averages.iter().copied().max_by(|a, b| a.total_cmp(b)),
        pass_count: averages.iter().filter(|a| **a >= pass_mark).count(),
    }
}

/// Competition ranking ("1, 2, 2, 4") of averages, best first. Entries
/// without an average are unranked and do not take a position.
pub fn competition_ranks(averages: &[Option<f64>]) -> Vec<Option<usize>> {
    let mut ranked: Vec<(usize, f64)> = averages
        .iter()
        .enumerate()
        .filter_map(|(i, a)| a.map(|v| (i, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut out = vec![None; averages.len()];
    let mut prev: Option<f64> = None;
    let mut prev_rank = 0usize;
    for (pos, (idx, v)) in ranked.into_iter().enumerate() {
        let rank = match prev {
            Some(p) if p == v => prev_rank,
            _ => pos + 1,
        };
        out[idx] = Some(rank);
        prev = Some(v);
        prev_rank = rank;
    }
    out
}

/// Attendance state for one student in one session. Absence is the only
/// state that can carry a justification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent { justified: bool },
}

impl AttendanceStatus {
    pub fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }

    pub fn is_justified(self) -> bool {
        matches!(self, Self::Absent { justified: true })
    }

    pub fn with_present(self, present: bool) -> Self {
        match (present, self) {
            (true, _) => Self::Present,
            (false, Self::Present) => Self::Absent { justified: false },
            (false, absent) => absent,
        }
    }

    pub fn with_justified(self, justified: bool) -> Self {
        match (justified, self) {
            (true, _) => Self::Absent { justified: true },
            (false, Self::Present) => Self::Present,
            (false, Self::Absent { .. }) => Self::Absent { justified: false },
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent { justified: true } => "absent_justified",
            Self::Absent { justified: false } => "absent_unjustified",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "present" => Some(Self::Present),
            "absent_justified" => Some(Self::Absent { justified: true }),
            "absent_unjustified" => Some(Self::Absent { justified: false }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub comment: String,
}

impl AttendanceRecord {
    pub fn present(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            status: AttendanceStatus::Present,
            comment: String::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.status.is_present()
    }

    pub fn is_justified(&self) -> bool {
        self.status.is_justified()
    }

    pub fn set_present(&mut self, present: bool) {
        self.status = self.status.with_present(present);
    }

    pub fn set_justified(&mut self, justified: bool) {
        self.status = self.status.with_justified(justified);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTally {
    pub total: usize,
    pub present: usize,
    pub absent_justified: usize,
    pub absent_unjustified: usize,
}

impl AttendanceTally {
    pub fn absent(&self) -> usize {
        self.total - self.present
    }

    /// Percent of present entries; an empty roster counts as full attendance.
    pub fn attendance_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        round_2_decimals(100.0 * self.present as f64 / self.total as f64)
    }
}

pub fn tally<I>(statuses: I) -> AttendanceTally
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut total = 0usize;
    let mut present = 0usize;
    let mut absent_justified = 0usize;
    for s in statuses {
        total += 1;
        match s {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent { justified: true } => absent_justified += 1,
            AttendanceStatus::Absent { justified: false } => {}
        }
    }
    AttendanceTally {
        total,
        present,
        absent_justified,
        absent_unjustified: (total - present) - absent_justified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(h1: f64, h2: f64, exam: f64) -> GradeRecord {
        GradeRecord {
            student_id: "s".to_string(),
            homework1: Some(h1),
            homework2: Some(h2),
            exam: Some(exam),
        }
    }

    #[test]
    fn weighted_average_matches_reference_row() {
        assert_eq!(weighted_average(15.0, 16.0, 17.0), 16.4);
        assert_eq!(weighted_average(14.0, 13.0, 15.0), 14.4);
        assert_eq!(weighted_average(0.0, 0.0, 0.0), 0.0);
        assert_eq!(weighted_average(20.0, 20.0, 20.0), 20.0);
    }

    #[test]
    fn weighted_average_is_rounded_to_two_decimals() {
        // 12.5*0.4 + 13.3*0.6 = 12.98
        assert_eq!(weighted_average(12.0, 13.0, 13.3), 12.98);
        // 15.25*0.4 + 11.1*0.6 = 12.76
        assert_eq!(weighted_average(15.0, 15.5, 11.1), 12.76);
    }

    #[test]
    fn out_of_range_input_keeps_prior_value() {
        let mut r = full(12.0, 14.0, 13.0);
        assert!(!r.set(GradeComponent::Exam, 25.0));
        assert!(!r.set(GradeComponent::Homework1, -3.0));
        assert!(!r.set(GradeComponent::Homework2, f64::NAN));
        assert_eq!(r, full(12.0, 14.0, 13.0));

        assert!(!r.set_text(GradeComponent::Exam, "abc"));
        assert!(!r.set_text(GradeComponent::Exam, ""));
        assert_eq!(r.exam, Some(13.0));

        assert!(r.set_text(GradeComponent::Exam, " 18,5 "));
        assert_eq!(r.exam, Some(18.5));
    }

    #[test]
    fn average_needs_every_component() {
        let mut r = GradeRecord::new("s1");
        assert_eq!(r.average(), None);
        r.set(GradeComponent::Homework1, 15.0);
        r.set(GradeComponent::Homework2, 16.0);
        assert_eq!(r.average(), None);
        r.set(GradeComponent::Exam, 17.0);
        assert_eq!(r.average(), Some(16.4));
    }

    #[test]
    fn sheet_summary_skips_incomplete_records() {
        let rows = vec![
            full(15.0, 16.0, 17.0),
            full(12.0, 14.0, 13.0),
            full(6.0, 8.0, 7.0),
            GradeRecord::new("blank"),
        ];
        let s = sheet_summary(&rows, 10.0);
        assert_eq!(s.record_count, 4);
        assert_eq!(s.filled_count, 3);
        assert_eq!(s.min, Some(7.0));
        assert_eq!(s.max, Some(16.4));
        assert_eq!(s.pass_count, 2);
        // (16.4 + 13.0 + 7.0) / 3 = 12.1333
        assert_eq!(s.class_average, Some(12.13));
    }

    #[test]
    fn competition_ranks_share_ties_and_skip_blanks() {
        let ranks = competition_ranks(&[Some(12.0), None, Some(16.4), Some(12.0), Some(9.5)]);
        assert_eq!(ranks, vec![Some(2), None, Some(1), Some(2), Some(4)]);
    }

    #[test]
    fn present_and_justified_are_mutually_exclusive() {
        let mut r = AttendanceRecord::present("s1");
        r.set_justified(true);
        assert!(!r.is_present());
        assert!(r.is_justified());

        r.set_present(true);
        assert!(r.is_present());
        assert!(!r.is_justified());

        r.set_present(false);
        assert_eq!(r.status, AttendanceStatus::Absent { justified: false });

        r.set_justified(true);
        r.set_present(false);
        assert_eq!(r.status, AttendanceStatus::Absent { justified: true });

        r.set_justified(false);
        assert_eq!(r.status, AttendanceStatus::Absent { justified: false });

        let mut p = AttendanceRecord::present("s2");
        p.set_justified(false);
        assert!(p.is_present());
    }

    #[test]
    fn tally_counts_every_state() {
        let statuses = vec![
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Absent { justified: true },
            AttendanceStatus::Present,
            AttendanceStatus::Absent { justified: false },
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Present,
        ];
        let t = tally(statuses);
        assert_eq!(t.total, 8);
        assert_eq!(t.present, 6);
        assert_eq!(t.absent_justified, 1);
        assert_eq!(t.absent_unjustified, 1);
        assert_eq!(t.absent(), 2);
        assert_eq!(t.attendance_rate(), 75.0);
    }

    #[test]
    fn tally_identity_holds_for_generated_rosters() {
        let all = [
            AttendanceStatus::Present,
            AttendanceStatus::Absent { justified: true },
            AttendanceStatus::Absent { justified: false },
        ];
        for n in 0..40usize {
            let statuses: Vec<_> = (0..n).map(|i| all[(i * 7 + n) % 3]).collect();
            let t = tally(statuses);
            assert_eq!(t.total, n);
            assert_eq!(t.absent_unjustified, t.total - t.present - t.absent_justified);
        }
        assert_eq!(tally(Vec::new()).attendance_rate(), 100.0);
    }

    #[test]
    fn status_codes_roundtrip() {
        for s in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent { justified: true },
            AttendanceStatus::Absent { justified: false },
        ] {
            assert_eq!(AttendanceStatus::from_code(s.code()), Some(s));
        }
        assert_eq!(AttendanceStatus::from_code("late"), None);
    }
}
