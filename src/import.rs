use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::AttendanceRecord;
use crate::store::RetentionStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub unknown_students: usize,
    /// Rows that could not be decoded or written.
    pub failed: usize,
}

#[derive(serde::Deserialize)]
struct CsvRow {
    email: String,
    course_code: String,
    session_date: NaiveDate,
    present: bool,
    late_minutes: Option<i32>,
}

pub async fn import_attendance_csv(
    store: &dyn RetentionStore,
    csv_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_attendance(store, file).await
}

/// Loads `email,course_code,session_date,present,late_minutes` rows. Rows
/// that are malformed, name an unknown student or fail to store are logged
/// and counted; only a read error on the input aborts the import.
pub async fn import_attendance<R: io::Read>(
    store: &dyn RetentionStore,
    input: R,
) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("failed to read row {line}"));
            }
            Err(e) => {
                tracing::warn!(line, error = %e, "malformed attendance row, skipping");
                summary.failed += 1;
                continue;
            }
        };

        let student = match store.find_student_by_email(&row.email).await {
            Ok(Some(student)) => student,
            Ok(None) => {
                tracing::warn!(line, email = %row.email, "no student with this email, skipping row");
                summary.unknown_students += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(line, email = %row.email, error = %e, "student lookup failed, skipping row");
                summary.failed += 1;
                continue;
            }
        };

        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: student.id,
            course_code: row.course_code,
            session_date: row.session_date,
            present: row.present,
            late_minutes: row.late_minutes,
        };

        match store.insert_attendance(&record).await {
            Ok(true) => summary.inserted += 1,
            Ok(false) => summary.duplicates += 1,
            Err(e) => {
                tracing::warn!(line, student_id = %student.id, error = %e, "failed to store attendance row");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        unknown_students = summary.unknown_students,
        failed = summary.failed,
        "attendance import finished"
    );
    Ok(summary)
}
