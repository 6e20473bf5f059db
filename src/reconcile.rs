//! Mark reconciliation: turns a mark sheet (roster + working input) and the
//! server-side marks for a test into a list of write intents.
//!
//! Nothing here touches the store. `apply::apply_plan` executes the plan.

use crate::model::{Mark, MarkStatus, NewTest, Student, Test, TestSpec, WorkingInput};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("test date is required")]
    MissingTestDate,
    #[error("total marks is required")]
    MissingTotalMarks,
    #[error("total marks must be a positive number (got {total_marks})")]
    InvalidTotalMarks { total_marks: f64 },
    #[error("standard and subject are required")]
    MissingClassOrSubject,
    #[error("no students found")]
    EmptyRoster,
    #[error("{student_name}: marks cannot be greater than {total_marks}")]
    ScoreExceedsTotal {
        student_id: String,
        student_name: String,
        score: f64,
        total_marks: f64,
    },
    #[error("{student_name}: marks cannot be negative")]
    NegativeScore {
        student_id: String,
        student_name: String,
        score: f64,
    },
    #[error("marks must be a number")]
    MissingScore,
    #[error("marks must be between 0 and {total_marks}")]
    EditOutOfRange {
        mark_id: String,
        score: f64,
        total_marks: f64,
    },
    #[error("cannot edit absent student")]
    AbsentMarkNotEditable { mark_id: String },
    #[error("mark {mark_id} does not belong to test {test_id}")]
    TestMismatch { mark_id: String, test_id: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::AbsentMarkNotEditable { .. } => "absent_not_editable",
            ValidationError::ScoreExceedsTotal { .. } => "score_exceeds_total",
            ValidationError::NegativeScore { .. } => "negative_score",
            ValidationError::EditOutOfRange { .. } => "score_out_of_range",
            _ => "validation_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ValidationError::InvalidTotalMarks { total_marks } => {
                Some(json!({ "totalMarks": total_marks }))
            }
            ValidationError::ScoreExceedsTotal {
                student_id,
                student_name,
                score,
                total_marks,
            } => Some(json!({
                "studentId": student_id,
                "studentName": student_name,
                "score": score,
                "totalMarks": total_marks,
            })),
            ValidationError::NegativeScore {
                student_id,
                student_name,
                score,
            } => Some(json!({
                "studentId": student_id,
                "studentName": student_name,
                "score": score,
            })),
            ValidationError::EditOutOfRange {
                mark_id,
                score,
                total_marks,
            } => Some(json!({
                "markId": mark_id,
                "score": score,
                "totalMarks": total_marks,
            })),
            ValidationError::AbsentMarkNotEditable { mark_id } => {
                Some(json!({ "markId": mark_id }))
            }
            ValidationError::TestMismatch { mark_id, test_id } => {
                Some(json!({ "markId": mark_id, "testId": test_id }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TestWriteIntent {
    Create(NewTest),
    Existing { test_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MarkWriteIntent {
    /// Insert a mark against the plan's test.
    Create {
        student_id: String,
        status: MarkStatus,
        obtained_marks: Option<f64>,
    },
    /// Overwrite an existing mark. `obtained_marks` is `None` for `ABSENT`.
    Update {
        mark_id: String,
        student_id: String,
        status: MarkStatus,
        obtained_marks: Option<f64>,
    },
}

impl MarkWriteIntent {
    pub fn student_id(&self) -> &str {
        match self {
            MarkWriteIntent::Create { student_id, .. } => student_id,
            MarkWriteIntent::Update { student_id, .. } => student_id,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, MarkWriteIntent::Create { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub test: TestWriteIntent,
    pub marks: Vec<MarkWriteIntent>,
    /// Roster students with no input; they stay "not entered".
    pub skipped: Vec<String>,
}

pub fn reconcile(
    roster: &[Student],
    test: &TestSpec,
    input: &WorkingInput,
    existing: &[Mark],
) -> Result<ReconcilePlan, ValidationError> {
    if test.standard.trim().is_empty() || test.subject.trim().is_empty() {
        return Err(ValidationError::MissingClassOrSubject);
    }
    let test_date = test.test_date.ok_or(ValidationError::MissingTestDate)?;
    let total_marks = test.total_marks.ok_or(ValidationError::MissingTotalMarks)?;
    if !total_marks.is_finite() || total_marks <= 0.0 {
        return Err(ValidationError::InvalidTotalMarks { total_marks });
    }
    if roster.is_empty() {
        return Err(ValidationError::EmptyRoster);
    }

    // All-or-nothing gate: nothing is planned until every score checks out.
    for student in roster {
        let Some(entry) = input.get(&student.id) else {
            continue;
        };
        if entry.absent {
            continue;
        }
        let Some(score) = entry.finite_score() else {
            continue;
        };
        if score < 0.0 {
            return Err(ValidationError::NegativeScore {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                score,
            });
        }
        if score > total_marks {
            return Err(ValidationError::ScoreExceedsTotal {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                score,
                total_marks,
            });
        }
    }

    let test_intent = match &test.id {
        Some(id) => TestWriteIntent::Existing {
            test_id: id.clone(),
        },
        None => TestWriteIntent::Create(NewTest {
            standard: test.standard.clone(),
            subject: test.subject.clone(),
            test_date,
            total_marks,
        }),
    };

    // A test that does not exist yet cannot have marks.
    let existing_by_student: HashMap<&str, &Mark> = match &test.id {
        Some(test_id) => {
            let mut m = HashMap::new();
            for mark in existing.iter().filter(|m| &m.test_id == test_id) {
                m.entry(mark.student_id.as_str()).or_insert(mark);
            }
            m
        }
        None => HashMap::new(),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut marks = Vec::new();
    let mut skipped = Vec::new();

    for student in roster {
        if !seen.insert(student.id.as_str()) {
            continue;
        }
        let entry = input.get(&student.id).copied().unwrap_or_default();
        let current = existing_by_student.get(student.id.as_str());

        let (status, obtained_marks) = if entry.absent {
            (MarkStatus::Absent, None)
        } else if let Some(score) = entry.finite_score() {
            (MarkStatus::Present, Some(score))
        } else {
            skipped.push(student.id.clone());
            continue;
        };

        marks.push(match current {
            Some(mark) => MarkWriteIntent::Update {
                mark_id: mark.id.clone(),
                student_id: student.id.clone(),
                status,
                obtained_marks,
            },
            None => MarkWriteIntent::Create {
                student_id: student.id.clone(),
                status,
                obtained_marks,
            },
        });
    }

    Ok(ReconcilePlan {
        test: test_intent,
        marks,
        skipped,
    })
}

/// Plan the out-of-band edit of one existing mark.
pub fn plan_mark_edit(
    mark: &Mark,
    test: &Test,
    score: Option<f64>,
) -> Result<MarkWriteIntent, ValidationError> {
    if mark.test_id != test.id {
        return Err(ValidationError::TestMismatch {
            mark_id: mark.id.clone(),
            test_id: test.id.clone(),
        });
    }
    if mark.status == MarkStatus::Absent {
        return Err(ValidationError::AbsentMarkNotEditable {
            mark_id: mark.id.clone(),
        });
    }
    let score = score
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::MissingScore)?;
    if score < 0.0 || score > test.total_marks {
        return Err(ValidationError::EditOutOfRange {
            mark_id: mark.id.clone(),
            score,
            total_marks: test.total_marks,
        });
    }
    Ok(MarkWriteIntent::Update {
        mark_id: mark.id.clone(),
        student_id: mark.student_id.clone(),
        status: MarkStatus::Present,
        obtained_marks: Some(score),
    })
}
