use crate::ids::NumericId;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "mcq.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    // WAL keeps aggregate readers from blocking importers in other processes.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_number TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            test_id TEXT PRIMARY KEY,
            marks_available INTEGER NOT NULL CHECK(marks_available > 0),
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            test_id TEXT NOT NULL,
            student_number TEXT NOT NULL,
            marks_obtained INTEGER NOT NULL CHECK(marks_obtained >= 0),
            updated_at TEXT,
            PRIMARY KEY(test_id, student_number),
            FOREIGN KEY(test_id) REFERENCES tests(test_id),
            FOREIGN KEY(student_number) REFERENCES students(student_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_test ON results(test_id)",
        [],
    )?;

    Ok(())
}

pub fn sqlite_version(conn: &Connection) -> rusqlite::Result<String> {
    conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))
}

/// Names always take the submitted values. Returns rows written (0 or 1).
pub fn upsert_student(
    conn: &Connection,
    student_number: &NumericId,
    first_name: &str,
    last_name: &str,
    now: &str,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO students(student_number, first_name, last_name, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_number) DO UPDATE SET
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![student_number, first_name, last_name, now])
}

/// Capacity only ever grows: an existing row changes only when the submitted
/// value is strictly greater.
pub fn upsert_test(
    conn: &Connection,
    test_id: &NumericId,
    marks_available: i64,
    now: &str,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO tests(test_id, marks_available, updated_at)
         VALUES(?, ?, ?)
         ON CONFLICT(test_id) DO UPDATE SET
           marks_available = excluded.marks_available,
           updated_at = excluded.updated_at
         WHERE excluded.marks_available > tests.marks_available",
    )?;
    stmt.execute(params![test_id, marks_available, now])
}

/// Same monotonic rule as `upsert_test`, keyed by (test, student).
pub fn upsert_result(
    conn: &Connection,
    test_id: &NumericId,
    student_number: &NumericId,
    marks_obtained: i64,
    now: &str,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO results(test_id, student_number, marks_obtained, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(test_id, student_number) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           updated_at = excluded.updated_at
         WHERE excluded.marks_obtained > results.marks_obtained",
    )?;
    stmt.execute(params![test_id, student_number, marks_obtained, now])
}

pub fn test_marks_available(conn: &Connection, test_id: &NumericId) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT marks_available FROM tests WHERE test_id = ?",
        [test_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn result_marks(conn: &Connection, test_id: &NumericId) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT marks_obtained FROM results WHERE test_id = ? ORDER BY student_number",
    )?;
    let marks = stmt
        .query_map([test_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(marks)
}
