//! Records store: students, tests and marks in the workspace database.
//!
//! This is the collaborator the reconciler and the report projector read
//! from. Writes re-check the mark invariants so a bad caller cannot break them.

use crate::apply::MarkWriter;
use crate::model::{
    format_number, Mark, MarkPatch, MarkStatus, NewMark, NewStudent, NewTest, Student, Test,
};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn insert_failed(e: rusqlite::Error, table: &str) -> Self {
        let code = match &e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                "conflict"
            }
            _ => "db_insert_failed",
        };
        StoreError::new(code, e.to_string()).with_details(json!({ "table": table }))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::new("db_query_failed", e.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {}

/// Raw records for one test date, as fetched for the class-wise report.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRecords {
    pub tests: Vec<Test>,
    pub marks: Vec<Mark>,
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub mark_id: String,
    pub test_id: String,
    pub test_date: NaiveDate,
    pub subject: String,
    pub total_marks: f64,
    pub status: MarkStatus,
    pub obtained_marks: Option<f64>,
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn status_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<MarkStatus> {
    let raw: String = row.get(idx)?;
    MarkStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown mark status {}", raw).into(),
        )
    })
}

fn test_from_row(row: &Row<'_>) -> rusqlite::Result<Test> {
    Ok(Test {
        id: row.get(0)?,
        standard: row.get(1)?,
        subject: row.get(2)?,
        test_date: date_col(row, 3)?,
        total_marks: row.get(4)?,
    })
}

fn mark_from_row(row: &Row<'_>) -> rusqlite::Result<Mark> {
    Ok(Mark {
        id: row.get(0)?,
        student_id: row.get(1)?,
        test_id: row.get(2)?,
        status: status_col(row, 3)?,
        obtained_marks: row.get(4)?,
    })
}

fn date_text(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn check_score(status: MarkStatus, score: Option<f64>, total_marks: f64) -> Result<(), StoreError> {
    match (status, score) {
        (MarkStatus::Absent, _) => Ok(()),
        (MarkStatus::Present, None) => Err(StoreError::new(
            "bad_params",
            "present marks require obtainedMarks",
        )),
        (MarkStatus::Present, Some(v)) if !v.is_finite() || v < 0.0 || v > total_marks => {
            Err(StoreError::new(
                "bad_params",
                format!("marks must be between 0 and {}", format_number(total_marks)),
            )
            .with_details(json!({ "obtainedMarks": v, "totalMarks": total_marks })))
        }
        (MarkStatus::Present, Some(_)) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Students

fn attach_subjects(conn: &Connection, students: &mut [Student]) -> Result<(), StoreError> {
    if students.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "SELECT student_id, subject FROM student_subjects
         WHERE student_id IN ({})
         ORDER BY student_id, sort_order",
        placeholders(students.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let binds = students.iter().map(|s| Value::Text(s.id.clone()));
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_student: HashMap<String, Vec<String>> = HashMap::new();
    for (sid, subject) in rows {
        by_student.entry(sid).or_default().push(subject);
    }
    for s in students.iter_mut() {
        s.subjects = by_student.remove(&s.id).unwrap_or_default();
    }
    Ok(())
}

pub fn insert_student(conn: &Connection, new: &NewStudent) -> Result<Student, StoreError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // Student and subject rows land together or not at all.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StoreError::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO students(id, name, standard, created_at) VALUES(?, ?, ?, ?)",
        (&id, new.name.trim(), &new.standard, &now),
    )
    .map_err(|e| StoreError::insert_failed(e, "students"))?;

    for (i, subject) in new.subjects.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO student_subjects(student_id, subject, sort_order)
             VALUES(?, ?, ?)",
            (&id, subject, i as i64),
        )
        .map_err(|e| StoreError::insert_failed(e, "student_subjects"))?;
    }
    tx.commit()
        .map_err(|e| StoreError::new("db_commit_failed", e.to_string()))?;

    get_student(conn, &id)?.ok_or_else(|| StoreError::new("not_found", "student not found"))
}

pub fn get_student(conn: &Connection, student_id: &str) -> Result<Option<Student>, StoreError> {
    let student = conn
        .query_row(
            "SELECT id, name, standard FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    standard: r.get(2)?,
                    subjects: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(student) = student else {
        return Ok(None);
    };
    let mut one = [student];
    attach_subjects(conn, &mut one)?;
    let [student] = one;
    Ok(Some(student))
}

/// Roster scoped by standard and/or enrolled subject, sorted by name.
pub fn list_students(
    conn: &Connection,
    standard: Option<&str>,
    subject: Option<&str>,
) -> Result<Vec<Student>, StoreError> {
    let mut sql = String::from("SELECT s.id, s.name, s.standard FROM students s WHERE 1 = 1");
    let mut binds: Vec<Value> = Vec::new();
    if let Some(std) = standard {
        sql.push_str(" AND s.standard = ?");
        binds.push(Value::Text(std.to_string()));
    }
    if let Some(subject) = subject {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM student_subjects ss
                          WHERE ss.student_id = s.id AND ss.subject = ?)",
        );
        binds.push(Value::Text(subject.to_string()));
    }
    sql.push_str(" ORDER BY s.name COLLATE NOCASE, s.id");

    let mut stmt = conn.prepare(&sql)?;
    let mut students = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                standard: r.get(2)?,
                subjects: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    attach_subjects(conn, &mut students)?;
    Ok(students)
}

fn students_in_standards(
    conn: &Connection,
    standards: &[String],
) -> Result<Vec<Student>, StoreError> {
    if standards.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, standard FROM students
         WHERE standard IN ({})
         ORDER BY name COLLATE NOCASE, id",
        placeholders(standards.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let binds = standards.iter().map(|s| Value::Text(s.clone()));
    let mut students = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                standard: r.get(2)?,
                subjects: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    attach_subjects(conn, &mut students)?;
    Ok(students)
}

// ---------------------------------------------------------------------------
// Tests

pub fn get_test(conn: &Connection, test_id: &str) -> Result<Option<Test>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, standard, subject, test_date, total_marks FROM tests WHERE id = ?",
            [test_id],
            test_from_row,
        )
        .optional()?)
}

pub fn find_test(
    conn: &Connection,
    standard: &str,
    subject: &str,
    test_date: NaiveDate,
) -> Result<Option<Test>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, standard, subject, test_date, total_marks FROM tests
             WHERE standard = ? AND subject = ? AND test_date = ?",
            (standard, subject, date_text(test_date)),
            test_from_row,
        )
        .optional()?)
}

pub fn insert_test(conn: &Connection, new: &NewTest) -> Result<Test, StoreError> {
    if !new.total_marks.is_finite() || new.total_marks <= 0.0 {
        return Err(StoreError::new("bad_params", "totalMarks must be > 0")
            .with_details(json!({ "totalMarks": new.total_marks })));
    }
    if let Some(existing) = find_test(conn, &new.standard, &new.subject, new.test_date)? {
        return Err(
            StoreError::new("conflict", "a test already exists for this class, subject and date")
                .with_details(json!({ "testId": existing.id })),
        );
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tests(id, standard, subject, test_date, total_marks) VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &new.standard,
            &new.subject,
            date_text(new.test_date),
            new.total_marks,
        ),
    )
    .map_err(|e| StoreError::insert_failed(e, "tests"))?;
    Ok(Test {
        id,
        standard: new.standard.clone(),
        subject: new.subject.clone(),
        test_date: new.test_date,
        total_marks: new.total_marks,
    })
}

pub fn tests_on_date(conn: &Connection, test_date: NaiveDate) -> Result<Vec<Test>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, standard, subject, test_date, total_marks FROM tests
         WHERE test_date = ?
         ORDER BY CAST(standard AS INTEGER), standard, subject, id",
    )?;
    let tests = stmt
        .query_map([date_text(test_date)], test_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tests)
}

// ---------------------------------------------------------------------------
// Marks

pub fn get_mark(conn: &Connection, mark_id: &str) -> Result<Option<Mark>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, test_id, status, obtained_marks FROM marks WHERE id = ?",
            [mark_id],
            mark_from_row,
        )
        .optional()?)
}

pub fn marks_for_tests(conn: &Connection, test_ids: &[String]) -> Result<Vec<Mark>, StoreError> {
    if test_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, student_id, test_id, status, obtained_marks FROM marks
         WHERE test_id IN ({})
         ORDER BY test_id, rowid",
        placeholders(test_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let binds = test_ids.iter().map(|s| Value::Text(s.clone()));
    let marks = stmt
        .query_map(params_from_iter(binds), mark_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(marks)
}

pub fn marks_for_test(conn: &Connection, test_id: &str) -> Result<Vec<Mark>, StoreError> {
    marks_for_tests(conn, &[test_id.to_string()])
}

pub fn insert_mark(conn: &Connection, new: &NewMark) -> Result<Mark, StoreError> {
    let test = get_test(conn, &new.test_id)?.ok_or_else(|| {
        StoreError::new("not_found", "test not found").with_details(json!({ "testId": new.test_id }))
    })?;
    if get_student(conn, &new.student_id)?.is_none() {
        return Err(StoreError::new("not_found", "student not found")
            .with_details(json!({ "studentId": new.student_id })));
    }
    let obtained = match new.status {
        MarkStatus::Absent => None,
        MarkStatus::Present => new.obtained_marks,
    };
    check_score(new.status, obtained, test.total_marks)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM marks WHERE student_id = ? AND test_id = ?",
            (&new.student_id, &new.test_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(mark_id) = existing {
        return Err(
            StoreError::new("conflict", "a mark already exists for this student and test")
                .with_details(json!({ "markId": mark_id })),
        );
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO marks(id, student_id, test_id, status, obtained_marks, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.student_id,
            &new.test_id,
            new.status.as_str(),
            obtained,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| StoreError::insert_failed(e, "marks"))?;

    Ok(Mark {
        id,
        student_id: new.student_id.clone(),
        test_id: new.test_id.clone(),
        status: new.status,
        obtained_marks: obtained,
    })
}

pub fn update_mark(conn: &Connection, mark_id: &str, patch: &MarkPatch) -> Result<Mark, StoreError> {
    let current = get_mark(conn, mark_id)?.ok_or_else(|| {
        StoreError::new("not_found", "mark not found").with_details(json!({ "markId": mark_id }))
    })?;
    let test = get_test(conn, &current.test_id)?
        .ok_or_else(|| StoreError::new("not_found", "test not found"))?;

    let status = patch.status.unwrap_or(current.status);
    let obtained = match status {
        MarkStatus::Absent => None,
        MarkStatus::Present => patch.obtained_marks.or(match current.status {
            MarkStatus::Present => current.obtained_marks,
            MarkStatus::Absent => None,
        }),
    };
    check_score(status, obtained, test.total_marks)?;

    conn.execute(
        "UPDATE marks SET status = ?, obtained_marks = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), obtained, Utc::now().to_rfc3339(), mark_id),
    )
    .map_err(|e| StoreError::new("db_update_failed", e.to_string()))?;

    Ok(Mark {
        status,
        obtained_marks: obtained,
        ..current
    })
}

// ---------------------------------------------------------------------------
// Read models

/// Everything the class-wise report needs for one date: the date's tests,
/// their marks, and every student in the standards those tests cover.
pub fn date_records(conn: &Connection, test_date: NaiveDate) -> Result<DateRecords, StoreError> {
    let tests = tests_on_date(conn, test_date)?;
    let test_ids: Vec<String> = tests.iter().map(|t| t.id.clone()).collect();
    let marks = marks_for_tests(conn, &test_ids)?;

    let mut standards: Vec<String> = Vec::new();
    for t in &tests {
        if !standards.contains(&t.standard) {
            standards.push(t.standard.clone());
        }
    }
    let students = students_in_standards(conn, &standards)?;

    Ok(DateRecords {
        tests,
        marks,
        students,
    })
}

/// A student's full test history, newest first.
pub fn student_history(conn: &Connection, student_id: &str) -> Result<Vec<HistoryRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, t.id, t.test_date, t.subject, t.total_marks, m.status, m.obtained_marks
         FROM marks m
         JOIN tests t ON t.id = m.test_id
         WHERE m.student_id = ?
         ORDER BY t.test_date DESC, t.subject",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(HistoryRow {
                mark_id: r.get(0)?,
                test_id: r.get(1)?,
                test_date: date_col(r, 2)?,
                subject: r.get(3)?,
                total_marks: r.get(4)?,
                status: status_col(r, 5)?,
                obtained_marks: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `MarkWriter` over the workspace connection.
pub struct SqliteWriter<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteWriter<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MarkWriter for SqliteWriter<'_> {
    fn create_test(&mut self, test: &NewTest) -> Result<Test, StoreError> {
        insert_test(self.conn, test)
    }

    fn create_mark(&mut self, mark: &NewMark) -> Result<Mark, StoreError> {
        insert_mark(self.conn, mark)
    }

    fn update_mark(&mut self, mark_id: &str, patch: &MarkPatch) -> Result<Mark, StoreError> {
        update_mark(self.conn, mark_id, patch)
    }
}
