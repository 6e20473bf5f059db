use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{check_class_subject, db_conn, optional_filter, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::model::{MarkStatus, NewStudent, Student};
use crate::report::compare_standards;
use crate::store;
use serde_json::json;
use std::collections::HashMap;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let standard = optional_filter(req, "standard");
    let subject = optional_filter(req, "subject");

    match store::list_students(conn, standard.as_deref(), subject.as_deref()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => store_err(req, e),
    }
}

fn handle_students_grouped(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let standard = optional_filter(req, "standard");
    let students = match store::list_students(conn, standard.as_deref(), None) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    let mut by_standard: HashMap<String, Vec<Student>> = HashMap::new();
    for s in students {
        by_standard.entry(s.standard.clone()).or_default().push(s);
    }
    let mut groups: Vec<(String, Vec<Student>)> = by_standard.into_iter().collect();
    groups.sort_by(|a, b| compare_standards(&a.0, &b.0));

    let total: usize = groups.iter().map(|(_, v)| v.len()).sum();
    let groups: Vec<serde_json::Value> = groups
        .into_iter()
        .map(|(standard, students)| json!({ "standard": standard, "students": students }))
        .collect();
    ok(&req.id, json!({ "groups": groups, "total": total }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let standard = match required_str(req, "standard") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = check_class_subject(req, &standard, None) {
        return e;
    }

    let raw_subjects: Vec<String> = req
        .params
        .get("subjects")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let mut subjects: Vec<String> = Vec::with_capacity(raw_subjects.len());
    for subject in raw_subjects {
        if let Err(e) = check_class_subject(req, &standard, Some(&subject)) {
            return e;
        }
        if !subjects.contains(&subject) {
            subjects.push(subject);
        }
    }
    if subjects.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "select at least one subject",
            None,
        );
    }

    let new = NewStudent {
        name,
        standard,
        subjects,
    };
    match store::insert_student(conn, &new) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => store_err(req, e),
    }
}

fn handle_students_profile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student = match store::get_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return store_err(req, e),
    };
    let history = match store::student_history(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return store_err(req, e),
    };

    let present = history
        .iter()
        .filter(|h| h.status == MarkStatus::Present)
        .count();
    let absent = history.len() - present;

    ok(
        &req.id,
        json!({
            "student": student,
            "history": history,
            "testCount": history.len(),
            "presentCount": present,
            "absentCount": absent,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.grouped" => Some(handle_students_grouped(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.profile" => Some(handle_students_profile(state, req)),
        _ => None,
    }
}
