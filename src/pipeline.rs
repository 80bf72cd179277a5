use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::config::{AssessmentConfig, MAX_DAYS};
use crate::error::StoreError;
use crate::models::{
    Alert, AlertMetadata, AlertSeverity, AlertType, Prediction, SignalBundle, Student,
};
use crate::risk;
use crate::signals::collect_signals;
use crate::store::RetentionStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Also open academic/attendance alerts for students past the thresholds.
    pub raise_alerts: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub assessed: usize,
    pub written: usize,
    pub failed: usize,
    pub alerts_raised: usize,
}

#[derive(Debug, Clone)]
pub struct Assessment {
    pub student: Student,
    pub signals: SignalBundle,
    pub prediction: Prediction,
    pub written: bool,
}

pub fn build_prediction<R: Rng + ?Sized>(
    student_id: Uuid,
    signals: &SignalBundle,
    config: &AssessmentConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Prediction {
    let score = risk::score(signals);
    let ttl = Duration::days(config.prediction_ttl_days.clamp(1, MAX_DAYS));
    Prediction {
        student_id,
        risk_score: score as i32,
        risk_factors: risk::risk_factors(signals, score, config.auxiliary_factors, rng),
        recommendations: risk::recommendations(score),
        confidence_level: config.confidence.resolve(rng),
        model_version: config.model_version.clone(),
        prediction_date: now,
        expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

/// Upserts the prediction. Failures are logged and reported as `false`;
/// they are never retried or propagated.
pub async fn write_prediction(store: &dyn RetentionStore, prediction: &Prediction) -> bool {
    match store.upsert_prediction(prediction).await {
        Ok(()) => {
            tracing::debug!(
                student_id = %prediction.student_id,
                risk_score = prediction.risk_score,
                "prediction stored"
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                student_id = %prediction.student_id,
                error = %e,
                "failed to store prediction, continuing"
            );
            false
        }
    }
}

async fn assess(
    store: &dyn RetentionStore,
    config: &AssessmentConfig,
    student: Student,
    now: DateTime<Utc>,
) -> Result<Assessment, StoreError> {
    let signals = collect_signals(store, config, &student, now.date_naive()).await?;
    let prediction = {
        let mut rng = rand::thread_rng();
        build_prediction(student.id, &signals, config, now, &mut rng)
    };
    let written = write_prediction(store, &prediction).await;

    Ok(Assessment {
        student,
        signals,
        prediction,
        written,
    })
}

pub async fn assess_student(
    store: &dyn RetentionStore,
    config: &AssessmentConfig,
    student_id: Uuid,
) -> Result<Assessment, StoreError> {
    let student = store
        .fetch_student(student_id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "student",
            id: student_id,
        })?;
    assess(store, config, student, Utc::now()).await
}

/// Alerts warranted by a fresh assessment.
pub fn derive_alerts(
    student: &Student,
    signals: &SignalBundle,
    prediction: &Prediction,
    config: &AssessmentConfig,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if prediction.risk_score >= 70 {
        let severity = if prediction.risk_score >= 90 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::High
        };
        alerts.push(Alert::new(
            student.id,
            AlertType::Academic,
            severity,
            "High dropout risk",
            format!(
                "{} has a risk score of {}",
                student.full_name, prediction.risk_score
            ),
            AlertMetadata::RiskScore {
                risk_score: prediction.risk_score,
                model_version: prediction.model_version.clone(),
            },
        ));
    }

    if signals.attendance_rate < 70.0 {
        let severity = if signals.attendance_rate < 50.0 {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        };
        alerts.push(Alert::new(
            student.id,
            AlertType::Attendance,
            severity,
            "Low attendance",
            format!(
                "{} attended {:.0}% of sessions in the last {} days",
                student.full_name, signals.attendance_rate, config.attendance_window_days
            ),
            AlertMetadata::Attendance {
                attendance_rate: signals.attendance_rate,
                window_days: config.attendance_window_days,
            },
        ));
    }

    alerts
}

async fn raise_alerts(
    store: &dyn RetentionStore,
    config: &AssessmentConfig,
    assessment: &Assessment,
) -> usize {
    let mut raised = 0;
    let proposed = derive_alerts(
        &assessment.student,
        &assessment.signals,
        &assessment.prediction,
        config,
    );

    for alert in proposed {
        match store.has_open_alert(alert.student_id, alert.alert_type).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(student_id = %alert.student_id, error = %e, "could not check open alerts");
                continue;
            }
        }

        match store.insert_alert(&alert).await {
            Ok(()) => {
                tracing::info!(
                    student_id = %alert.student_id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    "alert raised"
                );
                raised += 1;
            }
            Err(e) => {
                tracing::warn!(student_id = %alert.student_id, error = %e, "failed to insert alert");
            }
        }
    }

    raised
}

/// Reassesses every active student one at a time. A failure for one student
/// is logged and the loop moves on to the next.
pub async fn update_student_predictions(
    store: &dyn RetentionStore,
    config: &AssessmentConfig,
    options: RefreshOptions,
) -> Result<RefreshSummary, StoreError> {
    let students = store.list_active_students().await?;
    let mut summary = RefreshSummary::default();
    tracing::info!(students = students.len(), "refreshing predictions");

    for student in students {
        let student_id = student.id;
        let assessment = match assess(store, config, student, Utc::now()).await {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(student_id = %student_id, error = %e, "skipping student");
                summary.failed += 1;
                continue;
            }
        };

        summary.assessed += 1;
        if assessment.written {
            summary.written += 1;
        } else {
            summary.failed += 1;
        }

        if options.raise_alerts {
            summary.alerts_raised += raise_alerts(store, config, &assessment).await;
        }
    }

    tracing::info!(
        assessed = summary.assessed,
        written = summary.written,
        failed = summary.failed,
        alerts_raised = summary.alerts_raised,
        "refresh finished"
    );
    Ok(summary)
}
