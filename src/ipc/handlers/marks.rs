use crate::apply::apply_plan;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    bool_flag, db_conn, optional_date, optional_f64, optional_filter, required_date, required_str,
    store_err, validation_err,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{MarkInput, MarkPatch, MarkStatus, NewMark, TestSpec, WorkingInput};
use crate::reconcile::{plan_mark_edit, reconcile, MarkWriteIntent};
use crate::report::project;
use crate::store::{self, SqliteWriter};
use serde_json::json;

fn parse_status(req: &Request, key: &str) -> Result<Option<MarkStatus>, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(raw) => MarkStatus::parse(raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "status must be one of: PRESENT, ABSENT",
                Some(json!({ "status": raw })),
            )
        }),
    }
}

fn parse_input(req: &Request) -> Result<WorkingInput, serde_json::Value> {
    match req.params.get("input") {
        None | Some(serde_json::Value::Null) => Ok(WorkingInput::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("input must map student ids to {{absent, score}}: {}", e),
                None,
            )
        }),
    }
}

fn handle_marks_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_str(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match parse_status(req, "status") {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", "missing status", None),
        Err(e) => return e,
    };
    let obtained_marks = match optional_f64(req, "obtainedMarks") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let new = NewMark {
        student_id,
        test_id,
        status,
        obtained_marks,
    };
    match store::insert_mark(conn, &new) {
        Ok(mark) => ok(&req.id, json!({ "mark": mark })),
        Err(e) => store_err(req, e),
    }
}

fn handle_marks_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match parse_status(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let obtained_marks = match optional_f64(req, "obtainedMarks") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let patch = MarkPatch {
        status,
        obtained_marks,
    };
    match store::update_mark(conn, &mark_id, &patch) {
        Ok(mark) => ok(&req.id, json!({ "mark": mark })),
        Err(e) => store_err(req, e),
    }
}

/// Single-mark edit from the report view. Absent marks stay read-only here.
fn handle_marks_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let obtained_marks = match optional_f64(req, "obtainedMarks") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mark = match store::get_mark(conn, &mark_id) {
        Ok(Some(m)) => m,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "mark not found",
                Some(json!({ "markId": mark_id })),
            )
        }
        Err(e) => return store_err(req, e),
    };
    let test = match store::get_test(conn, &mark.test_id) {
        Ok(Some(t)) => t,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "test not found",
                Some(json!({ "testId": mark.test_id })),
            )
        }
        Err(e) => return store_err(req, e),
    };

    let patch = match plan_mark_edit(&mark, &test, obtained_marks) {
        Ok(MarkWriteIntent::Update {
            status,
            obtained_marks,
            ..
        }) => MarkPatch {
            status: Some(status),
            obtained_marks,
        },
        Ok(MarkWriteIntent::Create { .. }) => {
            return err(&req.id, "internal", "edit planned a create", None)
        }
        Err(e) => return validation_err(req, e),
    };
    match store::update_mark(conn, &mark.id, &patch) {
        Ok(updated) => ok(&req.id, json!({ "mark": updated, "test": test })),
        Err(e) => store_err(req, e),
    }
}

/// Roster plus the existing test and its marks, shaped as the entry form's
/// working input.
fn handle_marks_entry_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let standard = match required_str(req, "standard") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_date = match required_date(req, "testDate") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let roster = match store::list_students(conn, Some(&standard), Some(&subject)) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };
    let test = match store::find_test(conn, &standard, &subject, test_date) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };
    let marks = match &test {
        Some(t) => match store::marks_for_test(conn, &t.id) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        },
        None => Vec::new(),
    };

    let mut input = WorkingInput::new();
    for m in &marks {
        if !roster.iter().any(|s| s.id == m.student_id) || input.contains_key(&m.student_id) {
            continue;
        }
        let entry = match (m.status, m.obtained_marks) {
            (MarkStatus::Absent, _) => MarkInput::absent(),
            (MarkStatus::Present, Some(v)) => MarkInput::score(v),
            (MarkStatus::Present, None) => continue,
        };
        input.insert(m.student_id.clone(), entry);
    }

    ok(
        &req.id,
        json!({
            "roster": roster,
            "test": test,
            "totalMarks": test.as_ref().map(|t| t.total_marks),
            "input": input,
        }),
    )
}

fn handle_marks_reconcile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let standard = optional_filter(req, "standard").unwrap_or_default();
    let subject = optional_filter(req, "subject").unwrap_or_default();
    let test_date = match optional_date(req, "testDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total_marks = match optional_f64(req, "totalMarks") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dry_run = bool_flag(req, "dryRun");

    let roster = if standard.is_empty() || subject.is_empty() {
        Vec::new()
    } else {
        match store::list_students(conn, Some(&standard), Some(&subject)) {
            Ok(v) => v,
            Err(e) => return store_err(req, e),
        }
    };
    let existing_test = match test_date {
        Some(d) if !standard.is_empty() && !subject.is_empty() => {
            match store::find_test(conn, &standard, &subject, d) {
                Ok(v) => v,
                Err(e) => return store_err(req, e),
            }
        }
        _ => None,
    };
    let (header, existing) = match &existing_test {
        Some(t) => match store::marks_for_test(conn, &t.id) {
            Ok(marks) => (TestSpec::for_existing(t), marks),
            Err(e) => return store_err(req, e),
        },
        None => (
            TestSpec {
                id: None,
                standard,
                subject,
                test_date,
                total_marks,
            },
            Vec::new(),
        ),
    };

    let plan = match reconcile(&roster, &header, &input, &existing) {
        Ok(v) => v,
        Err(e) => return validation_err(req, e),
    };
    if dry_run {
        let creates = plan.marks.iter().filter(|m| m.is_create()).count();
        return ok(
            &req.id,
            json!({
                "dryRun": true,
                "plan": plan,
                "creates": creates,
                "updates": plan.marks.len() - creates,
            }),
        );
    }

    let report = match apply_plan(&mut SqliteWriter::new(conn), &plan) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    // Re-read the whole date so the view reflects what was persisted.
    let Some(date) = header.test_date else {
        return err(&req.id, "bad_params", "missing testDate", None);
    };
    let records = match store::date_records(conn, date) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };
    let class_wise = project(&records.tests, &records.marks, &records.students);

    ok(
        &req.id,
        json!({
            "dryRun": false,
            "plan": plan,
            "apply": report,
            "complete": report.is_complete(),
            "testDate": date,
            "classWise": class_wise,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.create" => Some(handle_marks_create(state, req)),
        "marks.update" => Some(handle_marks_update(state, req)),
        "marks.edit" => Some(handle_marks_edit(state, req)),
        "marks.entrySheet" => Some(handle_marks_entry_sheet(state, req)),
        "marks.reconcile" => Some(handle_marks_reconcile(state, req)),
        _ => None,
    }
}
