use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, UnknownVariant};
use crate::models::{
    Alert, AlertMetadata, AlertType, AttendanceRecord, Intervention, Prediction, Recommendations,
    RiskFactors, Student,
};
use crate::store::RetentionStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_column<T>(column: &'static str, value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    value.parse().map_err(|e: UnknownVariant| StoreError::Decode {
        column,
        message: e.to_string(),
    })
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Student {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        gpa: row.try_get("gpa")?,
        career: row.try_get("career")?,
        current_semester: row.try_get("current_semester")?,
        credits_completed: row.try_get("credits_completed")?,
        credits_enrolled: row.try_get("credits_enrolled")?,
        status: parse_column("status", &status)?,
    })
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRecord, StoreError> {
    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_code: row.try_get("course_code")?,
        session_date: row.try_get("session_date")?,
        present: row.try_get("present")?,
        late_minutes: row.try_get("late_minutes")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<Alert, StoreError> {
    let alert_type: String = row.try_get("alert_type")?;
    let severity: String = row.try_get("severity")?;
    let metadata: Json<AlertMetadata> = row.try_get("metadata")?;
    Ok(Alert {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        alert_type: parse_column("alert_type", &alert_type)?,
        severity: parse_column("severity", &severity)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        resolved: row.try_get("resolved")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        due_date: row.try_get("due_date")?,
        metadata: metadata.0,
        created_at: row.try_get("created_at")?,
    })
}

fn prediction_from_row(row: &PgRow) -> Result<Prediction, StoreError> {
    let risk_factors: Json<RiskFactors> = row.try_get("risk_factors")?;
    let recommendations: Json<Recommendations> = row.try_get("recommendations")?;
    Ok(Prediction {
        student_id: row.try_get("student_id")?,
        risk_score: row.try_get("risk_score")?,
        risk_factors: risk_factors.0,
        recommendations: recommendations.0,
        confidence_level: row.try_get("confidence_level")?,
        model_version: row.try_get("model_version")?,
        prediction_date: row.try_get("prediction_date")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn intervention_from_row(row: &PgRow) -> Result<Intervention, StoreError> {
    let kind: String = row.try_get("intervention_type")?;
    let status: String = row.try_get("status")?;
    Ok(Intervention {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        intervention_type: parse_column("intervention_type", &kind)?,
        assigned_to: row.try_get("assigned_to")?,
        status: parse_column("status", &status)?,
        priority: row.try_get("priority")?,
        due_date: row.try_get("due_date")?,
        results: row.try_get("results")?,
        effectiveness_score: row.try_get("effectiveness_score")?,
        created_at: row.try_get("created_at")?,
    })
}

const STUDENT_COLUMNS: &str = "id, full_name, email, gpa, career, current_semester, \
     credits_completed, credits_enrolled, status";

const PREDICTION_COLUMNS: &str = "student_id, risk_score, risk_factors, recommendations, \
     confidence_level, model_version, prediction_date, expires_at";

/// `RetentionStore` backed by the `usm` Postgres schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl RetentionStore for PgStore {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>, StoreError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM usm.students WHERE id = $1");
        sqlx::query(&query)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM usm.students WHERE email = $1");
        sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn list_active_students(&self) -> Result<Vec<Student>, StoreError> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM usm.students WHERE status = 'active' ORDER BY full_name"
        );
        sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(student_from_row)
            .collect()
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usm.students
            (id, full_name, email, gpa, career, current_semester,
             credits_completed, credits_enrolled, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                gpa = EXCLUDED.gpa,
                career = EXCLUDED.career,
                current_semester = EXCLUDED.current_semester,
                credits_completed = EXCLUDED.credits_completed,
                credits_enrolled = EXCLUDED.credits_enrolled,
                status = EXCLUDED.status
            "#,
        )
        .bind(student.id)
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(student.gpa)
        .bind(&student.career)
        .bind(student.current_semester)
        .bind(student.credits_completed)
        .bind(student.credits_enrolled)
        .bind(student.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_attendance(
        &self,
        student_id: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, student_id, course_code, session_date, present, late_minutes
            FROM usm.attendance
            WHERE student_id = $1 AND session_date BETWEEN $2 AND $3
            ORDER BY session_date
            "#,
        )
        .bind(student_id)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(attendance_from_row)
        .collect()
    }

    /// `ON CONFLICT DO NOTHING` keeps the row already recorded for the session.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO usm.attendance
            (id, student_id, course_code, session_date, present, late_minutes)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(&record.course_code)
        .bind(record.session_date)
        .bind(record.present)
        .bind(record.late_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_open_alerts(&self, student_id: Uuid) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS open FROM usm.alerts WHERE student_id = $1 AND resolved = FALSE",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("open")?;
        u32::try_from(count).map_err(|e| StoreError::Decode {
            column: "open",
            message: e.to_string(),
        })
    }

    async fn has_open_alert(
        &self,
        student_id: Uuid,
        alert_type: AlertType,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM usm.alerts
                WHERE student_id = $1 AND alert_type = $2 AND resolved = FALSE
            ) AS open
            "#,
        )
        .bind(student_id)
        .bind(alert_type.as_str())
        .fetch_one(&self.pool)
        .await?
        .try_get("open")?;
        Ok(exists)
    }

    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usm.predictions
            (student_id, risk_score, risk_factors, recommendations,
             confidence_level, model_version, prediction_date, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (student_id) DO UPDATE
            SET risk_score = EXCLUDED.risk_score,
                risk_factors = EXCLUDED.risk_factors,
                recommendations = EXCLUDED.recommendations,
                confidence_level = EXCLUDED.confidence_level,
                model_version = EXCLUDED.model_version,
                prediction_date = EXCLUDED.prediction_date,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(prediction.student_id)
        .bind(prediction.risk_score)
        .bind(Json(prediction.risk_factors))
        .bind(Json(prediction.recommendations))
        .bind(prediction.confidence_level)
        .bind(&prediction.model_version)
        .bind(prediction.prediction_date)
        .bind(prediction.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_prediction(&self, student_id: Uuid) -> Result<Option<Prediction>, StoreError> {
        let query = format!("SELECT {PREDICTION_COLUMNS} FROM usm.predictions WHERE student_id = $1");
        sqlx::query(&query)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(prediction_from_row)
            .transpose()
    }

    async fn list_predictions(&self) -> Result<Vec<Prediction>, StoreError> {
        let query = format!(
            "SELECT {PREDICTION_COLUMNS} FROM usm.predictions ORDER BY risk_score DESC, prediction_date DESC"
        );
        sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(prediction_from_row)
            .collect()
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usm.alerts
            (id, student_id, alert_type, severity, title, description, resolved,
             resolved_by, resolved_at, due_date, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.student_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.resolved)
        .bind(alert.resolved_by)
        .bind(alert.resolved_at)
        .bind(alert.due_date)
        .bind(Json(&alert.metadata))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_alert(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, student_id, alert_type, severity, title, description, resolved,
                   resolved_by, resolved_at, due_date, metadata, created_at
            FROM usm.alerts
            WHERE id = $1
            "#,
        )
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(alert_from_row)
        .transpose()
    }

    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolver: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE usm.alerts
            SET resolved = TRUE, resolved_by = $2, resolved_at = $3
            WHERE id = $1 AND resolved = FALSE
            "#,
        )
        .bind(alert_id)
        .bind(resolver)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.fetch_alert(alert_id).await? {
            Some(_) => Err(StoreError::AlreadyResolved(alert_id)),
            None => Err(StoreError::NotFound {
                entity: "alert",
                id: alert_id,
            }),
        }
    }

    async fn insert_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usm.interventions
            (id, student_id, intervention_type, assigned_to, status, priority,
             due_date, results, effectiveness_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(intervention.id)
        .bind(intervention.student_id)
        .bind(intervention.intervention_type.as_str())
        .bind(intervention.assigned_to)
        .bind(intervention.status.as_str())
        .bind(intervention.priority)
        .bind(intervention.due_date)
        .bind(&intervention.results)
        .bind(intervention.effectiveness_score)
        .bind(intervention.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_intervention(
        &self,
        intervention_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, student_id, intervention_type, assigned_to, status, priority,
                   due_date, results, effectiveness_score, created_at
            FROM usm.interventions
            WHERE id = $1
            "#,
        )
        .bind(intervention_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(intervention_from_row)
        .transpose()
    }

    async fn update_intervention(&self, intervention: &Intervention) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE usm.interventions
            SET assigned_to = $2, status = $3, priority = $4, due_date = $5,
                results = $6, effectiveness_score = $7
            WHERE id = $1
            "#,
        )
        .bind(intervention.id)
        .bind(intervention.assigned_to)
        .bind(intervention.status.as_str())
        .bind(intervention.priority)
        .bind(intervention.due_date)
        .bind(&intervention.results)
        .bind(intervention.effectiveness_score)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "intervention",
                id: intervention.id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterventionStatus, StudentStatus};

    #[test]
    fn unknown_column_values_become_decode_errors() {
        let err = parse_column::<StudentStatus>("status", "suspended").unwrap_err();
        assert!(matches!(err, StoreError::Decode { column: "status", .. }));
        assert_eq!(
            parse_column::<InterventionStatus>("status", "in_progress").unwrap(),
            InterventionStatus::InProgress
        );
    }

    #[test]
    fn json_columns_keep_fixed_shapes() {
        let factors: RiskFactors = serde_json::from_value(serde_json::json!({
            "gpa": "high",
            "attendance": "medium",
            "financial": "low",
            "engagement": "medium",
            "social_integration": "low"
        }))
        .unwrap();
        assert_eq!(factors.gpa, crate::models::RiskLevel::High);
        assert!(serde_json::from_value::<RiskFactors>(serde_json::json!({"gpa": "high"})).is_err());
    }
}
