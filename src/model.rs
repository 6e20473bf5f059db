use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Class labels the school runs.
pub const STANDARDS: [&str; 4] = ["2", "5", "7", "8"];
pub const SUBJECTS: [&str; 3] = ["Maths", "Science", "English"];

pub fn is_known_standard(s: &str) -> bool {
    STANDARDS.contains(&s)
}

pub fn is_known_subject(s: &str) -> bool {
    SUBJECTS.contains(&s)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub standard: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub standard: String,
    pub subject: String,
    pub test_date: NaiveDate,
    pub total_marks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkStatus {
    Present,
    Absent,
}

impl MarkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkStatus::Present => "PRESENT",
            MarkStatus::Absent => "ABSENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRESENT" => Some(MarkStatus::Present),
            "ABSENT" => Some(MarkStatus::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub student_id: String,
    pub test_id: String,
    pub status: MarkStatus,
    pub obtained_marks: Option<f64>,
}

/// One student's pending entry on the mark sheet.
///
/// `score` is only meaningful when it is a finite number; `absent` wins over
/// any score that is also present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkInput {
    #[serde(default)]
    pub absent: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

impl MarkInput {
    pub fn score(value: f64) -> Self {
        Self {
            absent: false,
            score: Some(value),
        }
    }

    pub fn absent() -> Self {
        Self {
            absent: true,
            score: None,
        }
    }

    pub fn finite_score(&self) -> Option<f64> {
        self.score.filter(|v| v.is_finite())
    }
}

pub type WorkingInput = HashMap<String, MarkInput>;

/// Test header as the mark sheet knows it: either an existing test (with id)
/// or the fields for a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub standard: String,
    pub subject: String,
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_marks: Option<f64>,
}

impl TestSpec {
    pub fn for_existing(test: &Test) -> Self {
        Self {
            id: Some(test.id.clone()),
            standard: test.standard.clone(),
            subject: test.subject.clone(),
            test_date: Some(test.test_date),
            total_marks: Some(test.total_marks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTest {
    pub standard: String,
    pub subject: String,
    pub test_date: NaiveDate,
    pub total_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub standard: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMark {
    pub student_id: String,
    pub test_id: String,
    pub status: MarkStatus,
    #[serde(default)]
    pub obtained_marks: Option<f64>,
}

/// Partial update of a mark by identity. Unset fields keep their value,
/// except that `ABSENT` always clears the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPatch {
    #[serde(default)]
    pub status: Option<MarkStatus>,
    #[serde(default)]
    pub obtained_marks: Option<f64>,
}

/// Shortest decimal form of a mark: `8`, `8.5`, `0`.
pub fn format_number(v: f64) -> String {
    if v == 0.0 {
        // Avoid printing "-0".
        return "0".to_string();
    }
    format!("{}", v)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
