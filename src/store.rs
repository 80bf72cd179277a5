use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Alert, AlertType, AttendanceRecord, Intervention, Prediction, Student, StudentStatus,
};

/// Persistence seen by the assessment pipeline and staff actions.
#[async_trait::async_trait]
pub trait RetentionStore: Send + Sync {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError>;

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError>;

    async fn list_active_students(&self) -> Result<Vec<Student>, StoreError>;

    /// Inserts or replaces the student keyed by id.
    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Attendance with `since <= session_date <= until`.
    async fn fetch_attendance(
        &self,
        student_id: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Keeps the first record per (student, course, date). Returns whether the
    /// record was new.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<bool, StoreError>;

    async fn count_open_alerts(&self, student_id: Uuid) -> Result<u32, StoreError>;

    async fn has_open_alert(
        &self,
        student_id: Uuid,
        alert_type: AlertType,
    ) -> Result<bool, StoreError>;

    /// Inserts or replaces the prediction keyed by student id.
    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError>;

    async fn fetch_prediction(&self, student_id: Uuid) -> Result<Option<Prediction>, StoreError>;

    async fn list_predictions(&self) -> Result<Vec<Prediction>, StoreError>;

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn fetch_alert(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError>;

    /// Marks an unresolved alert resolved. Fails if it is already resolved.
    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolver: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_intervention(&self, intervention: &Intervention) -> Result<(), StoreError>;

    async fn fetch_intervention(
        &self,
        intervention_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError>;

    async fn update_intervention(&self, intervention: &Intervention) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    students: HashMap<Uuid, Student>,
    attendance: Vec<AttendanceRecord>,
    alerts: HashMap<Uuid, Alert>,
    predictions: HashMap<Uuid, Prediction>,
    interventions: HashMap<Uuid, Intervention>,
}

/// In-process store used by the offline demo and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RetentionStore for MemoryStore {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(self.tables.read().await.students.get(&student_id).cloned())
    }

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .students
            .values()
            .find(|student| student.email == email)
            .cloned())
    }

    async fn list_active_students(&self) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.read().await;
        let mut students: Vec<Student> = tables
            .students
            .values()
            .filter(|student| student.status == StudentStatus::Active)
            .cloned()
            .collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .students
            .insert(student.id, student.clone());
        Ok(())
    }

    async fn fetch_attendance(
        &self,
        student_id: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .attendance
            .iter()
            .filter(|record| {
                record.student_id == student_id
                    && (since..=until).contains(&record.session_date)
            })
            .cloned()
            .collect())
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let exists = tables.attendance.iter().any(|existing| {
            existing.student_id == record.student_id
                && existing.course_code == record.course_code
                && existing.session_date == record.session_date
        });
        if !exists {
            tables.attendance.push(record.clone());
        }
        Ok(!exists)
    }

    async fn count_open_alerts(&self, student_id: Uuid) -> Result<u32, StoreError> {
        let count = self
            .tables
            .read()
            .await
            .alerts
            .values()
            .filter(|alert| alert.student_id == student_id && !alert.resolved)
            .count();
        Ok(count as u32)
    }

    async fn has_open_alert(
        &self,
        student_id: Uuid,
        alert_type: AlertType,
    ) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.alerts.values().any(|alert| {
            alert.student_id == student_id && alert.alert_type == alert_type && !alert.resolved
        }))
    }

    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .predictions
            .insert(prediction.student_id, prediction.clone());
        Ok(())
    }

    async fn fetch_prediction(&self, student_id: Uuid) -> Result<Option<Prediction>, StoreError> {
        Ok(self.tables.read().await.predictions.get(&student_id).cloned())
    }

    async fn list_predictions(&self) -> Result<Vec<Prediction>, StoreError> {
        let mut predictions: Vec<Prediction> =
            self.tables.read().await.predictions.values().cloned().collect();
        predictions.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
        Ok(predictions)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.tables.write().await.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn fetch_alert(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
        Ok(self.tables.read().await.alerts.get(&alert_id).cloned())
    }

    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolver: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let alert = tables.alerts.get_mut(&alert_id).ok_or(StoreError::NotFound {
            entity: "alert",
            id: alert_id,
        })?;
        alert.resolve(resolver, at)
    }

    async fn insert_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .interventions
            .insert(intervention.id, intervention.clone());
        Ok(())
    }

    async fn fetch_intervention(
        &self,
        intervention_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError> {
        Ok(self.tables.read().await.interventions.get(&intervention_id).cloned())
    }

    async fn update_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.interventions.get_mut(&intervention.id) {
            Some(existing) => {
                *existing = intervention.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "intervention",
                id: intervention.id,
            }),
        }
    }
}

/// Store doubles shared by the async tests.
#[cfg(test)]
pub mod testing {
    use super::*;

    /// Delegates to a `MemoryStore` but refuses every write that concerns one
    /// student: its profile, attendance and predictions.
    pub struct FailingWrites {
        pub inner: MemoryStore,
        pub reject: Uuid,
    }

    impl FailingWrites {
        pub fn new(reject: Uuid) -> Self {
            Self {
                inner: MemoryStore::new(),
                reject,
            }
        }

        fn check(&self, student_id: Uuid) -> Result<(), StoreError> {
            if student_id == self.reject {
                return Err(StoreError::Invalid("write rejected".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl RetentionStore for FailingWrites {
        async fn fetch_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
            self.inner.fetch_student(id).await
        }
        async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
            self.inner.find_student_by_email(email).await
        }
        async fn list_active_students(&self) -> Result<Vec<Student>, StoreError> {
            self.inner.list_active_students().await
        }
        async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
            self.check(student.id)?;
            self.inner.upsert_student(student).await
        }
        async fn fetch_attendance(
            &self,
            id: Uuid,
            since: NaiveDate,
            until: NaiveDate,
        ) -> Result<Vec<AttendanceRecord>, StoreError> {
            self.inner.fetch_attendance(id, since, until).await
        }
        async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
            self.check(record.student_id)?;
            self.inner.insert_attendance(record).await
        }
        async fn count_open_alerts(&self, id: Uuid) -> Result<u32, StoreError> {
            self.inner.count_open_alerts(id).await
        }
        async fn has_open_alert(&self, id: Uuid, kind: AlertType) -> Result<bool, StoreError> {
            self.inner.has_open_alert(id, kind).await
        }
        async fn upsert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
            self.check(prediction.student_id)?;
            self.inner.upsert_prediction(prediction).await
        }
        async fn fetch_prediction(&self, id: Uuid) -> Result<Option<Prediction>, StoreError> {
            self.inner.fetch_prediction(id).await
        }
        async fn list_predictions(&self) -> Result<Vec<Prediction>, StoreError> {
            self.inner.list_predictions().await
        }
        async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
            self.inner.insert_alert(alert).await
        }
        async fn fetch_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
            self.inner.fetch_alert(id).await
        }
        async fn resolve_alert(
            &self,
            id: Uuid,
            resolver: Uuid,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.resolve_alert(id, resolver, at).await
        }
        async fn insert_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
            self.inner.insert_intervention(intervention).await
        }
        async fn fetch_intervention(&self, id: Uuid) -> Result<Option<Intervention>, StoreError> {
            self.inner.fetch_intervention(id).await
        }
        async fn update_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
            self.inner.update_intervention(intervention).await
        }
    }
}
