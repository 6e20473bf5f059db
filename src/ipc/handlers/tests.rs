use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    check_class_subject, db_conn, optional_f64, required_date, required_str, store_err,
};
use crate::ipc::types::{AppState, Request};
use crate::model::NewTest;
use crate::store;
use serde_json::json;

fn handle_tests_find(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match store::find_test(conn, &standard, &subject, test_date) {
        Ok(test) => ok(&req.id, json!({ "test": test })),
        Err(e) => store_err(req, e),
    }
}

fn handle_tests_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    if let Err(e) = check_class_subject(req, &standard, Some(&subject)) {
        return e;
    }
    let test_date = match required_date(req, "testDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total_marks = match optional_f64(req, "totalMarks") {
        Ok(Some(v)) => v,
        Ok(None) => {
            return err(&req.id, "bad_params", "missing totalMarks", None)
        }
        Err(e) => return e,
    };

    let new = NewTest {
        standard,
        subject,
        test_date,
        total_marks,
    };
    match store::insert_test(conn, &new) {
        Ok(test) => ok(&req.id, json!({ "test": test })),
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tests.find" => Some(handle_tests_find(state, req)),
        "tests.create" => Some(handle_tests_create(state, req)),
        _ => None,
    }
}
