use crate::db;
use crate::error::Result;
use crate::ids::NumericId;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// One scanned result, already validated by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub first_name: String,
    pub last_name: String,
    pub student_number: NumericId,
    pub test_id: NumericId,
    pub marks_available: i64,
    pub marks_obtained: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Always the batch length, whether or not any row changed.
    pub processed_records: usize,
    /// Rows inserted or changed by each rule; only logged.
    pub students_written: usize,
    pub tests_raised: usize,
    pub results_raised: usize,
}

/// Apply a batch as one unit of work.
///
/// Students take the latest names; tests and results only move upward. The
/// transaction is opened `IMMEDIATE` so a concurrent importer on the same
/// workspace waits for the write lock instead of comparing against a value
/// that is about to change.
pub fn reconcile(conn: &mut Connection, records: &[ParsedRecord]) -> Result<ImportSummary> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tracing::debug!(records = records.len(), "import transaction opened");

    match apply_batch(&tx, records) {
        Ok(summary) => {
            tx.commit()?;
            tracing::info!(
                processed = summary.processed_records,
                students = summary.students_written,
                tests_raised = summary.tests_raised,
                results_raised = summary.results_raised,
                "import committed"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::error!(error = %rollback_err, "import rollback failed");
            }
            tracing::warn!(error = %e, "import rolled back");
            Err(e.into())
        }
    }
}

fn apply_batch(tx: &Transaction<'_>, records: &[ParsedRecord]) -> rusqlite::Result<ImportSummary> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut summary = ImportSummary {
        processed_records: records.len(),
        ..ImportSummary::default()
    };

    for (i, r) in records.iter().enumerate() {
        tracing::debug!(
            index = i,
            student_number = %r.student_number,
            test_id = %r.test_id,
            marks_available = r.marks_available,
            marks_obtained = r.marks_obtained,
            "importing record"
        );
        summary.students_written +=
            db::upsert_student(tx, &r.student_number, &r.first_name, &r.last_name, &now)?;
        summary.tests_raised += db::upsert_test(tx, &r.test_id, r.marks_available, &now)?;
        summary.results_raised +=
            db::upsert_result(tx, &r.test_id, &r.student_number, r.marks_obtained, &now)?;
    }

    Ok(summary)
}
