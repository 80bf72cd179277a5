use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, UnknownVariant};

/// Text-backed enum: serde, `as_str`, `Display` and `FromStr` all agree on
/// the snake_case column value.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant::new($kind, other)),
                }
            }
        }
    };
}

text_enum!(StudentStatus, "student status", {
    Active => "active",
    Inactive => "inactive",
    Graduated => "graduated",
    Dropped => "dropped",
});

text_enum!(AlertType, "alert type", {
    Academic => "academic",
    Attendance => "attendance",
    Behavioral => "behavioral",
    Financial => "financial",
    Technical => "technical",
});

text_enum!(AlertSeverity, "alert severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

text_enum!(InterventionKind, "intervention type", {
    Tutoring => "tutoring",
    Counseling => "counseling",
    Mentoring => "mentoring",
    FinancialAid => "financial_aid",
    AcademicAdvising => "academic_advising",
    CareerGuidance => "career_guidance",
    PsychologicalSupport => "psychological_support",
    StudyGroup => "study_group",
});

text_enum!(InterventionStatus, "intervention status", {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    /// Bucket used by reports: 70 and up is high, 40 and up is medium.
    pub fn from_score(score: i32) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(UnknownVariant::new("risk level", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    /// 0.0 to 4.0 scale; `None` until the first grade is posted.
    pub gpa: Option<f64>,
    pub career: String,
    pub current_semester: i32,
    pub credits_completed: i32,
    pub credits_enrolled: i32,
    pub status: StudentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_code: String,
    pub session_date: NaiveDate,
    pub present: bool,
    pub late_minutes: Option<i32>,
}

/// Structured payload carried by an alert, one shape per origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertMetadata {
    RiskScore {
        risk_score: i32,
        model_version: String,
    },
    Attendance {
        attendance_rate: f64,
        window_days: i64,
    },
    Manual {
        note: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub student_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub metadata: AlertMetadata,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        student_id: Uuid,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        metadata: AlertMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            alert_type,
            severity,
            title: title.into(),
            description: description.into(),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            due_date: None,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn resolve(&mut self, resolver: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.resolved {
            return Err(StoreError::AlreadyResolved(self.id));
        }
        self.resolved = true;
        self.resolved_by = Some(resolver);
        self.resolved_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub gpa: RiskLevel,
    pub attendance: RiskLevel,
    pub financial: RiskLevel,
    pub engagement: RiskLevel,
    pub social_integration: RiskLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub tutoring: bool,
    pub counseling: bool,
    pub financial_aid: bool,
    pub mentoring: bool,
    pub study_groups: bool,
    pub career_guidance: bool,
    pub psychological_support: bool,
}

impl Recommendations {
    pub fn flags(&self) -> [(&'static str, bool); 7] {
        [
            ("tutoring", self.tutoring),
            ("counseling", self.counseling),
            ("financial_aid", self.financial_aid),
            ("mentoring", self.mentoring),
            ("study_groups", self.study_groups),
            ("career_guidance", self.career_guidance),
            ("psychological_support", self.psychological_support),
        ]
    }

    pub fn active(&self) -> Vec<&'static str> {
        self.flags()
            .into_iter()
            .filter_map(|(name, on)| on.then_some(name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub student_id: Uuid,
    pub risk_score: i32,
    pub risk_factors: RiskFactors,
    pub recommendations: Recommendations,
    pub confidence_level: f64,
    pub model_version: String,
    pub prediction_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Prediction {
    /// Advisory only; nothing evicts expired rows.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub student_id: Uuid,
    pub intervention_type: InterventionKind,
    pub assigned_to: Option<Uuid>,
    pub status: InterventionStatus,
    /// 1 (lowest) to 5 (most urgent).
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub results: Option<String>,
    pub effectiveness_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl InterventionStatus {
    pub fn can_transition_to(self, next: InterventionStatus) -> bool {
        use InterventionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }
}

fn check_scale(field: &str, value: i32) -> Result<(), StoreError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!("{field} must be between 1 and 5, got {value}")))
    }
}

impl Intervention {
    pub fn new(
        student_id: Uuid,
        intervention_type: InterventionKind,
        priority: i32,
        assigned_to: Option<Uuid>,
        due_date: Option<NaiveDate>,
    ) -> Result<Self, StoreError> {
        check_scale("priority", priority)?;
        Ok(Self {
            id: Uuid::new_v4(),
            student_id,
            intervention_type,
            assigned_to,
            status: InterventionStatus::Pending,
            priority,
            due_date,
            results: None,
            effectiveness_score: None,
            created_at: Utc::now(),
        })
    }

    /// Moves the intervention along its lifecycle. Results and an
    /// effectiveness score may only be recorded when completing it.
    pub fn advance(
        &mut self,
        next: InterventionStatus,
        results: Option<String>,
        effectiveness_score: Option<i32>,
    ) -> Result<(), StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next != InterventionStatus::Completed
            && (results.is_some() || effectiveness_score.is_some())
        {
            return Err(StoreError::Invalid(
                "results are only recorded on completion".to_string(),
            ));
        }
        if let Some(score) = effectiveness_score {
            check_scale("effectiveness_score", score)?;
        }

        self.status = next;
        if results.is_some() {
            self.results = results;
        }
        if effectiveness_score.is_some() {
            self.effectiveness_score = effectiveness_score;
        }
        Ok(())
    }
}

/// Inputs to the risk scorer for one student.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalBundle {
    pub gpa: f64,
    /// Percentage, 0 to 100.
    pub attendance_rate: f64,
    pub open_alert_count: u32,
}
