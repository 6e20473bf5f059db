//! Executes a `ReconcilePlan` against a `MarkWriter`, one student at a time.
//!
//! There is no transaction around the batch. A failed write stops the batch
//! and the report says which students were written, which one failed and which
//! were never attempted. Re-running reconcile after a refresh turns every
//! persisted create into an update, so the whole batch can be retried.

use crate::model::{Mark, MarkPatch, NewMark, NewTest, Test};
use crate::reconcile::{MarkWriteIntent, ReconcilePlan, TestWriteIntent};
use crate::store::StoreError;
use serde::Serialize;

pub trait MarkWriter {
    fn create_test(&mut self, test: &NewTest) -> Result<Test, StoreError>;
    fn create_mark(&mut self, mark: &NewMark) -> Result<Mark, StoreError>;
    fn update_mark(&mut self, mark_id: &str, patch: &MarkPatch) -> Result<Mark, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedWrite {
    pub student_id: String,
    pub mark_id: String,
    pub action: WriteAction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    pub student_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub test_id: String,
    pub test_created: bool,
    pub applied: Vec<AppliedWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<WriteFailure>,
    pub not_attempted: Vec<String>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run the plan. Fails outright only when the test itself cannot be resolved;
/// mark failures are reported in the returned `ApplyReport`.
pub fn apply_plan<W: MarkWriter>(
    writer: &mut W,
    plan: &ReconcilePlan,
) -> Result<ApplyReport, StoreError> {
    let (test_id, test_created) = match &plan.test {
        TestWriteIntent::Create(new) => (writer.create_test(new)?.id, true),
        TestWriteIntent::Existing { test_id } => (test_id.clone(), false),
    };

    let mut report = ApplyReport {
        test_id: test_id.clone(),
        test_created,
        applied: Vec::with_capacity(plan.marks.len()),
        failure: None,
        not_attempted: Vec::new(),
    };

    for (i, intent) in plan.marks.iter().enumerate() {
        let result = match intent {
            MarkWriteIntent::Create {
                student_id,
                status,
                obtained_marks,
            } => writer
                .create_mark(&NewMark {
                    student_id: student_id.clone(),
                    test_id: test_id.clone(),
                    status: *status,
                    obtained_marks: *obtained_marks,
                })
                .map(|m| (m.id, WriteAction::Created)),
            MarkWriteIntent::Update {
                mark_id,
                status,
                obtained_marks,
                ..
            } => writer
                .update_mark(
                    mark_id,
                    &MarkPatch {
                        status: Some(*status),
                        obtained_marks: *obtained_marks,
                    },
                )
                .map(|m| (m.id, WriteAction::Updated)),
        };

        match result {
            Ok((mark_id, action)) => report.applied.push(AppliedWrite {
                student_id: intent.student_id().to_string(),
                mark_id,
                action,
            }),
            Err(e) => {
                report.failure = Some(WriteFailure {
                    student_id: intent.student_id().to_string(),
                    code: e.code,
                    message: e.message,
                });
                report.not_attempted = plan.marks[i + 1..]
                    .iter()
                    .map(|m| m.student_id().to_string())
                    .collect();
                break;
            }
        }
    }

    Ok(report)
}
