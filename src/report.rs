//! Class-wise report projection.
//!
//! Folds flat `tests`, `marks` and `students` into rows grouped by standard.
//! Every row's `marks` field is one of `"<obtained> / <total>"`, `"ABSENT"`
//! or `"-"` (not entered).

use crate::model::{format_number, Mark, MarkStatus, Student, Test};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

pub const ABSENT_SENTINEL: &str = "ABSENT";
pub const NOT_ENTERED_SENTINEL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkDisplay {
    Scored { obtained: f64, total: f64 },
    Absent,
    NotEntered,
}

impl MarkDisplay {
    fn from_mark(mark: Option<&Mark>, total: f64) -> Self {
        match mark {
            None => MarkDisplay::NotEntered,
            Some(m) => match (m.status, m.obtained_marks) {
                (MarkStatus::Absent, _) => MarkDisplay::Absent,
                (MarkStatus::Present, Some(v)) => MarkDisplay::Scored { obtained: v, total },
                // A present mark without a score is unusable; show it as not entered.
                (MarkStatus::Present, None) => MarkDisplay::NotEntered,
            },
        }
    }
}

impl fmt::Display for MarkDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkDisplay::Scored { obtained, total } => {
                write!(f, "{} / {}", format_number(*obtained), format_number(*total))
            }
            MarkDisplay::Absent => f.write_str(ABSENT_SENTINEL),
            MarkDisplay::NotEntered => f.write_str(NOT_ENTERED_SENTINEL),
        }
    }
}

impl Serialize for MarkDisplay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_id: String,
    pub name: String,
    pub subject: String,
    pub marks: MarkDisplay,
    pub status: Option<MarkStatus>,
    pub obtained_marks: Option<f64>,
    pub total_marks: f64,
    pub mark_id: Option<String>,
    pub test_id: String,
    pub test_date: NaiveDate,
}

impl ReportRow {
    fn build(student: &Student, test: &Test, mark: Option<&Mark>) -> Self {
        Self {
            student_id: student.id.clone(),
            name: student.name.clone(),
            subject: test.subject.clone(),
            marks: MarkDisplay::from_mark(mark, test.total_marks),
            status: mark.map(|m| m.status),
            obtained_marks: mark.and_then(|m| match m.status {
                MarkStatus::Present => m.obtained_marks,
                MarkStatus::Absent => None,
            }),
            total_marks: test.total_marks,
            mark_id: mark.map(|m| m.id.clone()),
            test_id: test.id.clone(),
            test_date: test.test_date,
        }
    }
}

/// Standard -> rows, in test order then roster order.
pub type ClassWiseReport = BTreeMap<String, Vec<ReportRow>>;

fn index_marks(marks: &[Mark]) -> HashMap<(&str, &str), &Mark> {
    let mut by_pair = HashMap::with_capacity(marks.len());
    for m in marks {
        by_pair
            .entry((m.student_id.as_str(), m.test_id.as_str()))
            .or_insert(m);
    }
    by_pair
}

/// One row per (test, student in the test's standard), mark or not.
pub fn project(tests: &[Test], marks: &[Mark], students: &[Student]) -> ClassWiseReport {
    let by_pair = index_marks(marks);
    let mut out = ClassWiseReport::new();

    for test in tests {
        let rows = out.entry(test.standard.clone()).or_default();
        for student in students.iter().filter(|s| s.standard == test.standard) {
            let mark = by_pair
                .get(&(student.id.as_str(), test.id.as_str()))
                .copied();
            rows.push(ReportRow::build(student, test, mark));
        }
    }

    out
}

/// Single-test preview: the roster joined against a flat mark list, at most
/// one row per student, grouped by the student's standard.
pub fn project_single_test(test: &Test, roster: &[Student], marks: &[Mark]) -> ClassWiseReport {
    let by_pair = index_marks(marks);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = ClassWiseReport::new();

    for student in roster {
        if !seen.insert(student.id.as_str()) {
            continue;
        }
        let mark = by_pair
            .get(&(student.id.as_str(), test.id.as_str()))
            .copied();
        out.entry(student.standard.clone())
            .or_default()
            .push(ReportRow::build(student, test, mark));
    }

    out
}

/// Orders standards numerically when both parse ("2" < "10"), else as text.
pub fn compare_standards(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
