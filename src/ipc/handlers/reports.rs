use crate::export::{layout_class_report, FontRegistration, LayoutOptions};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_date, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::report::{compare_standards, project, project_single_test, ClassWiseReport};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

/// Standards of a report in display order ("2" before "10").
fn ordered_standards(report: &ClassWiseReport) -> Vec<&String> {
    let mut standards: Vec<&String> = report.keys().collect();
    standards.sort_by(|a, b| compare_standards(a, b));
    standards
}

fn class_wise_for(
    conn: &Connection,
    req: &Request,
) -> Result<(chrono::NaiveDate, ClassWiseReport), serde_json::Value> {
    let test_date = required_date(req, "testDate")?;
    let records = store::date_records(conn, test_date).map_err(|e| store_err(req, e))?;
    Ok((
        test_date,
        project(&records.tests, &records.marks, &records.students),
    ))
}

fn handle_reports_by_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_date = match required_date(req, "testDate") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::date_records(conn, test_date) {
        Ok(records) => ok(&req.id, json!(records)),
        Err(e) => store_err(req, e),
    }
}

fn handle_reports_class_wise(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (test_date, report) = match class_wise_for(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    ok(
        &req.id,
        json!({
            "testDate": test_date,
            "standards": ordered_standards(&report),
            "report": report,
        }),
    )
}

fn handle_reports_test_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_str(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let test = match store::get_test(conn, &test_id) {
        Ok(Some(t)) => t,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "test not found",
                Some(json!({ "testId": test_id })),
            )
        }
        Err(e) => return store_err(req, e),
    };
    let roster = match store::list_students(conn, Some(&test.standard), Some(&test.subject)) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };
    let marks = match store::marks_for_test(conn, &test.id) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    let report = project_single_test(&test, &roster, &marks);
    ok(
        &req.id,
        json!({
            "test": test,
            "standards": ordered_standards(&report),
            "report": report,
        }),
    )
}

fn handle_reports_class_wise_pdf_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (test_date, report) = match class_wise_for(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut opts = LayoutOptions::default();
    if let Some(prefix) = req
        .params
        .get("headingPrefix")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        opts.heading_prefix = prefix.to_string();
    }
    match req.params.get("headingFont") {
        None | Some(serde_json::Value::Null) => {}
        Some(v) => match serde_json::from_value::<FontRegistration>(v.clone()) {
            Ok(font) => opts.heading_font = Some(font),
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("headingFont must be {{family, source, script?}}: {}", e),
                    None,
                )
            }
        },
    }

    let document = layout_class_report(&report, &opts);
    ok(
        &req.id,
        json!({
            "testDate": test_date,
            "sectionCount": document.section_count(),
            "document": document,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.byDate" => Some(handle_reports_by_date(state, req)),
        "reports.classWise" => Some(handle_reports_class_wise(state, req)),
        "reports.testPreview" => Some(handle_reports_test_preview(state, req)),
        "reports.classWisePdfModel" => Some(handle_reports_class_wise_pdf_model(state, req)),
        _ => None,
    }
}
