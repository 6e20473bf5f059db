use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "marks.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            standard TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    ensure_students_created_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_standard ON students(standard)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_subjects(
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(student_id, subject),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_subjects_subject ON student_subjects(subject)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            id TEXT PRIMARY KEY,
            standard TEXT NOT NULL,
            subject TEXT NOT NULL,
            test_date TEXT NOT NULL,
            total_marks REAL NOT NULL,
            UNIQUE(standard, subject, test_date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tests_date ON tests(test_date)",
        [],
    )?;

    // One mark per (student, test). The reconciler relies on this to turn
    // a repeated create into a conflict instead of a duplicate row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            test_id TEXT NOT NULL,
            status TEXT NOT NULL,
            obtained_marks REAL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(test_id) REFERENCES tests(id),
            UNIQUE(student_id, test_id)
        )",
        [],
    )?;
    ensure_marks_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_test ON marks(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    migrate_absent_scores(conn)?;

    Ok(())
}

fn ensure_students_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN created_at TEXT", [])?;
    Ok(())
}

fn ensure_marks_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "marks", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE marks ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn migrate_absent_scores(conn: &Connection) -> anyhow::Result<()> {
    // Absent marks carry no score; older rows kept the last typed value.
    conn.execute(
        "UPDATE marks SET obtained_marks = NULL
         WHERE status = 'ABSENT' AND obtained_marks IS NOT NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "marks", "updated_at").expect("pragma"));
    }

    #[test]
    fn absent_rows_lose_stale_scores() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        conn.execute(
            "INSERT INTO students(id, name, standard) VALUES('s1', 'Asha', '5')",
            [],
        )
        .expect("student");
        conn.execute(
            "INSERT INTO tests(id, standard, subject, test_date, total_marks)
             VALUES('t1', '5', 'Maths', '2026-03-14', 10)",
            [],
        )
        .expect("test");
        conn.execute(
            "INSERT INTO marks(id, student_id, test_id, status, obtained_marks)
             VALUES('m1', 's1', 't1', 'ABSENT', 4)",
            [],
        )
        .expect("mark");

        init_schema(&conn).expect("reinit");
        let v: Option<f64> = conn
            .query_row("SELECT obtained_marks FROM marks WHERE id = 'm1'", [], |r| {
                r.get(0)
            })
            .expect("query");
        assert_eq!(v, None);
    }
}
