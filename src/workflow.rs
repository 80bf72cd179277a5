use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Alert, Intervention, InterventionKind, InterventionStatus};
use crate::store::RetentionStore;

pub async fn resolve_alert(
    store: &dyn RetentionStore,
    alert_id: Uuid,
    resolver: Uuid,
) -> Result<Alert, StoreError> {
    store.resolve_alert(alert_id, resolver, Utc::now()).await?;
    let alert = store.fetch_alert(alert_id).await?.ok_or(StoreError::NotFound {
        entity: "alert",
        id: alert_id,
    })?;
    tracing::info!(alert_id = %alert_id, resolver = %resolver, "alert resolved");
    Ok(alert)
}

pub async fn open_intervention(
    store: &dyn RetentionStore,
    student_id: Uuid,
    kind: InterventionKind,
    priority: i32,
    assigned_to: Option<Uuid>,
    due_date: Option<NaiveDate>,
) -> Result<Intervention, StoreError> {
    if store.fetch_student(student_id).await?.is_none() {
        return Err(StoreError::NotFound {
            entity: "student",
            id: student_id,
        });
    }
    let intervention = Intervention::new(student_id, kind, priority, assigned_to, due_date)?;
    store.insert_intervention(&intervention).await?;
    tracing::info!(
        intervention_id = %intervention.id,
        student_id = %student_id,
        kind = %kind,
        "intervention opened"
    );
    Ok(intervention)
}

/// Validates the lifecycle step before anything is written.
pub async fn advance_intervention(
    store: &dyn RetentionStore,
    intervention_id: Uuid,
    next: InterventionStatus,
    results: Option<String>,
    effectiveness_score: Option<i32>,
) -> Result<Intervention, StoreError> {
    let mut intervention = store
        .fetch_intervention(intervention_id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "intervention",
            id: intervention_id,
        })?;
    let previous = intervention.status;
    intervention.advance(next, results, effectiveness_score)?;
    store.update_intervention(&intervention).await?;
    tracing::info!(
        intervention_id = %intervention_id,
        from = %previous,
        to = %next,
        "intervention updated"
    );
    Ok(intervention)
}
