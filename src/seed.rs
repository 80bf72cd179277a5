use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Alert, AlertMetadata, AlertSeverity, AlertType, AttendanceRecord, Student, StudentStatus,
};
use crate::store::RetentionStore;

/// Sessions per student in the seeded window, one every other day.
const SESSIONS: i64 = 14;

pub struct DemoData {
    pub students: Vec<Student>,
    pub attendance: Vec<AttendanceRecord>,
    pub alerts: Vec<Alert>,
}

struct DemoStudent {
    id: u128,
    name: &'static str,
    email: &'static str,
    gpa: Option<f64>,
    career: &'static str,
    semester: i32,
    status: StudentStatus,
    /// Absent on every n-th session; `None` attends all of them.
    absent_every: Option<i64>,
    attends: bool,
}

const STUDENTS: &[DemoStudent] = &[
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0001,
        name: "Valentina Muñoz",
        email: "valentina.munoz@usm.cl",
        gpa: Some(3.7),
        career: "Ingeniería Civil Informática",
        semester: 6,
        status: StudentStatus::Active,
        absent_every: None,
        attends: true,
    },
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0002,
        name: "Matías González",
        email: "matias.gonzalez@usm.cl",
        gpa: Some(2.3),
        career: "Ingeniería Comercial",
        semester: 3,
        status: StudentStatus::Active,
        absent_every: Some(3),
        attends: true,
    },
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0003,
        name: "Sofía Rojas",
        email: "sofia.rojas@usm.cl",
        gpa: Some(1.7),
        career: "Ingeniería Civil Mecánica",
        semester: 2,
        status: StudentStatus::Active,
        absent_every: Some(2),
        attends: true,
    },
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0004,
        name: "Benjamín Díaz",
        email: "benjamin.diaz@usm.cl",
        gpa: None,
        career: "Arquitectura",
        semester: 1,
        status: StudentStatus::Active,
        absent_every: None,
        attends: false,
    },
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0005,
        name: "Isidora Pérez",
        email: "isidora.perez@usm.cl",
        gpa: Some(2.8),
        career: "Ingeniería Civil Química",
        semester: 4,
        status: StudentStatus::Active,
        absent_every: Some(5),
        attends: true,
    },
    DemoStudent {
        id: 0x5e1f_0001_0000_4000_8000_0000_0000_0006,
        name: "Tomás Silva",
        email: "tomas.silva@usm.cl",
        gpa: Some(2.0),
        career: "Ingeniería Civil Eléctrica",
        semester: 5,
        status: StudentStatus::Inactive,
        absent_every: Some(2),
        attends: true,
    },
];

fn course_for(career: &str) -> String {
    let prefix: String = career
        .split_whitespace()
        .last()
        .unwrap_or("GEN")
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect();
    format!("{}101", prefix.to_ascii_uppercase())
}

/// Deterministic ids so seeding twice leaves one copy of everything.
fn attendance_id(student: u128, session: i64) -> Uuid {
    Uuid::from_u128(student ^ ((session as u128 + 1) << 64))
}

pub fn demo_data(today: NaiveDate) -> DemoData {
    let mut students = Vec::new();
    let mut attendance = Vec::new();

    for demo in STUDENTS {
        let semester_credits = 18;
        let student = Student {
            id: Uuid::from_u128(demo.id),
            full_name: demo.name.to_string(),
            email: demo.email.to_string(),
            gpa: demo.gpa,
            career: demo.career.to_string(),
            current_semester: demo.semester,
            credits_completed: (demo.semester - 1) * semester_credits,
            credits_enrolled: semester_credits,
            status: demo.status,
        };

        if demo.attends {
            let course_code = course_for(demo.career);
            for session in 0..SESSIONS {
                let present = match demo.absent_every {
                    Some(n) => session % n != 0,
                    None => true,
                };
                attendance.push(AttendanceRecord {
                    id: attendance_id(demo.id, session),
                    student_id: student.id,
                    course_code: course_code.clone(),
                    session_date: today - Duration::days(session * 2 + 1),
                    present,
                    late_minutes: (present && session % 4 == 1).then_some(10),
                });
            }
        }

        students.push(student);
    }

    let mut financial = Alert::new(
        Uuid::from_u128(STUDENTS[2].id),
        AlertType::Financial,
        AlertSeverity::High,
        "Tuition payment overdue",
        "Second installment unpaid for 45 days",
        AlertMetadata::Manual {
            note: "Referred to financial aid office".to_string(),
        },
    );
    financial.id = Uuid::from_u128(0x5e1f_0002_0000_4000_8000_0000_0000_0001);
    financial.due_date = Some(today + Duration::days(14));

    let mut academic = Alert::new(
        Uuid::from_u128(STUDENTS[1].id),
        AlertType::Academic,
        AlertSeverity::Medium,
        "Failed first calculus exam",
        "Scored 2.1 on the first midterm",
        AlertMetadata::Manual {
            note: "Instructor recommends tutoring".to_string(),
        },
    );
    academic.id = Uuid::from_u128(0x5e1f_0002_0000_4000_8000_0000_0000_0002);
    academic.created_at = Utc::now() - Duration::days(5);

    DemoData {
        students,
        attendance,
        alerts: vec![financial, academic],
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub students: usize,
    pub attendance: usize,
    pub alerts: usize,
    pub failed: usize,
}

/// Writes the demo dataset into `store`. Safe to run repeatedly. A row that
/// cannot be written is logged and counted, and loading carries on.
pub async fn load_demo(store: &dyn RetentionStore, today: NaiveDate) -> SeedSummary {
    let data = demo_data(today);
    let mut summary = SeedSummary::default();

    for student in &data.students {
        match store.upsert_student(student).await {
            Ok(()) => summary.students += 1,
            Err(e) => {
                tracing::warn!(email = %student.email, error = %e, "skipping student");
                summary.failed += 1;
            }
        }
    }

    for record in &data.attendance {
        match store.insert_attendance(record).await {
            Ok(true) => summary.attendance += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "skipping attendance row");
                summary.failed += 1;
            }
        }
    }

    for alert in &data.alerts {
        match store.insert_alert(alert).await {
            Ok(()) => summary.alerts += 1,
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "skipping alert");
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssessmentConfig;
    use crate::pipeline::{update_student_predictions, RefreshOptions};
    use crate::store::testing::FailingWrites;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    #[test]
    fn demo_ids_are_stable_and_unique() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let first = demo_data(today);
        let second = demo_data(today);
        assert_eq!(
            first.attendance.iter().map(|r| r.id).collect::<Vec<_>>(),
            second.attendance.iter().map(|r| r.id).collect::<Vec<_>>()
        );
        let ids: HashSet<Uuid> = first.attendance.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), first.attendance.len());
        assert_eq!(course_for("Ingeniería Civil Química"), "QUM101");
    }

    #[tokio::test]
    async fn demo_data_spans_risk_levels() {
        let store = MemoryStore::new();
        let loaded = load_demo(&store, Utc::now().date_naive()).await;
        assert_eq!(loaded.students, STUDENTS.len());
        assert_eq!(loaded.alerts, 2);
        assert_eq!(loaded.failed, 0);

        let summary = update_student_predictions(
            &store,
            &AssessmentConfig::default(),
            RefreshOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(summary.assessed, 5);

        let score_of = |id: u128| {
            let store = &store;
            async move {
                store
                    .fetch_prediction(Uuid::from_u128(id))
                    .await
                    .unwrap()
                    .unwrap()
                    .risk_score
            }
        };
        assert_eq!(score_of(STUDENTS[0].id).await, 5);
        assert_eq!(score_of(STUDENTS[1].id).await, 65);
        assert_eq!(score_of(STUDENTS[2].id).await, 80);
        assert_eq!(score_of(STUDENTS[3].id).await, 5);
        assert_eq!(score_of(STUDENTS[4].id).await, 35);
    }

    #[tokio::test]
    async fn reloading_adds_no_attendance() {
        let store = MemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let first = load_demo(&store, today).await;
        let second = load_demo(&store, today).await;
        assert!(first.attendance > 0);
        assert_eq!(second.attendance, 0);
        assert_eq!(second.students, STUDENTS.len());
    }

    #[tokio::test]
    async fn failed_rows_do_not_stop_loading() {
        let rejected = Uuid::from_u128(STUDENTS[1].id);
        let store = FailingWrites::new(rejected);
        let loaded = load_demo(&store, NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()).await;

        assert_eq!(loaded.students, STUDENTS.len() - 1);
        assert_eq!(loaded.failed, 1 + SESSIONS as usize);
        assert_eq!(loaded.alerts, 2);
        assert!(store.fetch_student(rejected).await.unwrap().is_none());
        let last = Uuid::from_u128(STUDENTS[STUDENTS.len() - 1].id);
        assert!(store.fetch_student(last).await.unwrap().is_some());
    }
}
