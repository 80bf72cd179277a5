use chrono::{Duration, NaiveDate};

use crate::config::{AssessmentConfig, MAX_DAYS};
use crate::error::StoreError;
use crate::models::{AttendanceRecord, SignalBundle, Student};
use crate::store::RetentionStore;

/// Percentage of sessions attended within `since..=until`, or `None` when
/// there is nothing in the window.
pub fn attendance_rate(
    records: &[AttendanceRecord],
    since: NaiveDate,
    until: NaiveDate,
) -> Option<f64> {
    let (present, total) = records
        .iter()
        .filter(|record| (since..=until).contains(&record.session_date))
        .fold((0usize, 0usize), |(present, total), record| {
            (present + usize::from(record.present), total + 1)
        });

    if total == 0 {
        None
    } else {
        Some(present as f64 * 100.0 / total as f64)
    }
}

/// First day of the attendance window ending at `today`. The window length is
/// clamped to `1..=MAX_DAYS`.
pub fn window_start(today: NaiveDate, window_days: i64) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(window_days.clamp(1, MAX_DAYS)))
        .unwrap_or(NaiveDate::MIN)
}

/// Gathers the scorer inputs for `student`. Missing data falls back to the
/// configured defaults rather than counting as risk.
pub async fn collect_signals(
    store: &dyn RetentionStore,
    config: &AssessmentConfig,
    student: &Student,
    today: NaiveDate,
) -> Result<SignalBundle, StoreError> {
    let since = window_start(today, config.attendance_window_days);
    let records = store.fetch_attendance(student.id, since, today).await?;
    let open_alert_count = store.count_open_alerts(student.id).await?;

    let gpa = student
        .gpa
        .filter(|gpa| gpa.is_finite())
        .unwrap_or(config.neutral_gpa);
    let attendance_rate =
        attendance_rate(&records, since, today).unwrap_or(config.default_attendance_rate);

    Ok(SignalBundle {
        gpa,
        attendance_rate,
        open_alert_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, AlertMetadata, AlertSeverity, AlertType, StudentStatus};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 30).unwrap()
    }

    fn student(gpa: Option<f64>) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: "Camila Rojas".to_string(),
            email: "camila.rojas@usm.edu".to_string(),
            gpa,
            career: "Psychology".to_string(),
            current_semester: 2,
            credits_completed: 20,
            credits_enrolled: 16,
            status: StudentStatus::Active,
        }
    }

    fn session(student_id: Uuid, days_ago: i64, present: bool) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id,
            course_code: format!("PSY{days_ago:03}"),
            session_date: today() - Duration::days(days_ago),
            present,
            late_minutes: None,
        }
    }

    #[test]
    fn rate_counts_only_the_window() {
        let id = Uuid::new_v4();
        let records = vec![
            session(id, 1, true),
            session(id, 2, false),
            session(id, 3, true),
            session(id, 4, true),
            session(id, 45, false),
        ];
        let rate = attendance_rate(&records, window_start(today(), 30), today()).unwrap();
        assert!((rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_window_has_no_rate() {
        let id = Uuid::new_v4();
        let records = vec![session(id, 60, true)];
        assert_eq!(attendance_rate(&records, window_start(today(), 30), today()), None);
    }

    #[test]
    fn future_sessions_are_outside_the_window() {
        let id = Uuid::new_v4();
        let records = vec![session(id, 0, false), session(id, -3, true), session(id, -10, true)];
        let rate = attendance_rate(&records, window_start(today(), 30), today()).unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn oversized_windows_are_clamped() {
        assert_eq!(window_start(today(), i64::MAX), today() - Duration::days(MAX_DAYS));
        assert_eq!(window_start(NaiveDate::MIN, 30), NaiveDate::MIN);
        assert_eq!(window_start(today(), -4), today() - Duration::days(1));
    }

    #[tokio::test]
    async fn missing_data_uses_defaults() {
        let store = MemoryStore::new();
        let config = AssessmentConfig::default();
        let student = student(None);
        store.upsert_student(&student).await.unwrap();

        let signals = collect_signals(&store, &config, &student, today()).await.unwrap();
        assert_eq!(signals.gpa, config.neutral_gpa);
        assert_eq!(signals.attendance_rate, 90.0);
        assert_eq!(signals.open_alert_count, 0);
    }

    #[tokio::test]
    async fn collects_attendance_and_open_alerts() {
        let store = MemoryStore::new();
        let config = AssessmentConfig::default();
        let student = student(Some(2.3));
        store.upsert_student(&student).await.unwrap();
        store.insert_attendance(&session(student.id, 1, true)).await.unwrap();
        store.insert_attendance(&session(student.id, 2, false)).await.unwrap();

        let mut resolved = Alert::new(
            student.id,
            AlertType::Academic,
            AlertSeverity::Low,
            "Late assignment",
            "Submitted late",
            AlertMetadata::Manual { note: String::new() },
        );
        resolved.resolve(Uuid::new_v4(), chrono::Utc::now()).unwrap();
        store.insert_alert(&resolved).await.unwrap();
        let open = Alert::new(
            student.id,
            AlertType::Financial,
            AlertSeverity::High,
            "Tuition overdue",
            "Balance pending",
            AlertMetadata::Manual { note: String::new() },
        );
        store.insert_alert(&open).await.unwrap();

        let signals = collect_signals(&store, &config, &student, today()).await.unwrap();
        assert_eq!(signals.gpa, 2.3);
        assert_eq!(signals.attendance_rate, 50.0);
        assert_eq!(signals.open_alert_count, 1);
    }

    #[tokio::test]
    async fn future_dated_attendance_is_ignored() {
        let store = MemoryStore::new();
        let config = AssessmentConfig::default();
        let student = student(Some(3.2));
        store.upsert_student(&student).await.unwrap();
        store.insert_attendance(&session(student.id, 1, false)).await.unwrap();
        store.insert_attendance(&session(student.id, -2, true)).await.unwrap();
        store.insert_attendance(&session(student.id, -20, true)).await.unwrap();

        let signals = collect_signals(&store, &config, &student, today()).await.unwrap();
        assert_eq!(signals.attendance_rate, 0.0);
    }

    #[tokio::test]
    async fn non_finite_gpa_is_treated_as_missing() {
        let store = MemoryStore::new();
        let config = AssessmentConfig::default();
        let student = student(Some(f64::NAN));
        let signals = collect_signals(&store, &config, &student, today()).await.unwrap();
        assert_eq!(signals.gpa, config.neutral_gpa);
    }
}
