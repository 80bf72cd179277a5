use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Prediction, RiskLevel, Student};
use crate::store::RetentionStore;

#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    pub level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}

pub fn summarize_by_level(predictions: &[Prediction]) -> Vec<LevelSummary> {
    let mut map: HashMap<RiskLevel, (usize, i64)> = HashMap::new();

    for prediction in predictions {
        let entry = map
            .entry(RiskLevel::from_score(prediction.risk_score))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += i64::from(prediction.risk_score);
    }

    let mut summaries: Vec<LevelSummary> = map
        .into_iter()
        .map(|(level, (count, total))| LevelSummary {
            level,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.level.cmp(&a.level));
    summaries
}

/// Number of predictions recommending each action, most common first.
pub fn count_recommendations(predictions: &[Prediction]) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for prediction in predictions {
        for name in prediction.recommendations.active() {
            *counts.entry(name).or_default() += 1;
        }
    }

    let mut counts: Vec<(&'static str, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    counts
}

pub fn build_report(
    predictions: &[Prediction],
    students: &[Student],
    generated_at: DateTime<Utc>,
) -> String {
    let names: HashMap<Uuid, &Student> = students.iter().map(|s| (s.id, s)).collect();
    let summaries = summarize_by_level(predictions);
    let recommendations = count_recommendations(predictions);

    let mut ranked = predictions.to_vec();
    ranked.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

    let mut output = String::new();
    let _ = writeln!(output, "# Student Retention Report");
    let _ = writeln!(
        output,
        "Generated {} from {} predictions",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        predictions.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg score {:.1})",
                summary.level, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students assessed.");
    } else {
        for prediction in ranked.iter().take(10) {
            let label = match names.get(&prediction.student_id) {
                Some(student) => format!("{} ({}, {})", student.full_name, student.email, student.career),
                None => prediction.student_id.to_string(),
            };
            let actions = prediction.recommendations.active();
            let _ = writeln!(
                output,
                "- {} score {} (confidence {:.2}){}",
                label,
                prediction.risk_score,
                prediction.confidence_level,
                if actions.is_empty() {
                    String::new()
                } else {
                    format!(": {}", actions.join(", "))
                }
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommended Actions");

    if recommendations.is_empty() {
        let _ = writeln!(output, "No actions recommended.");
    } else {
        for (name, count) in recommendations.iter() {
            let _ = writeln!(output, "- {name}: {count}");
        }
    }

    let expired = predictions
        .iter()
        .filter(|p| p.is_expired(generated_at))
        .count();
    if expired > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "{expired} predictions are past their expiry; run `refresh` to recompute them."
        );
    }

    output
}

/// Builds the report from the stored predictions, naming every student that
/// has one whatever their current status.
pub async fn render_report(
    store: &dyn RetentionStore,
    generated_at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let predictions = store.list_predictions().await?;
    let mut students = Vec::with_capacity(predictions.len());
    for prediction in &predictions {
        if let Some(student) = store.fetch_student(prediction.student_id).await? {
            students.push(student);
        }
    }
    Ok(build_report(&predictions, &students, generated_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskFactors, StudentStatus};
    use crate::risk;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn prediction(student_id: Uuid, score: i32, made: DateTime<Utc>) -> Prediction {
        Prediction {
            student_id,
            risk_score: score,
            risk_factors: RiskFactors {
                gpa: RiskLevel::Low,
                attendance: RiskLevel::Low,
                financial: RiskLevel::Medium,
                engagement: RiskLevel::Medium,
                social_integration: RiskLevel::Medium,
            },
            recommendations: risk::recommendations(score as u32),
            confidence_level: 0.85,
            model_version: "usm-risk-v1".to_string(),
            prediction_date: made,
            expires_at: made + Duration::days(30),
        }
    }

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@usm.cl", name.to_lowercase()),
            gpa: Some(2.5),
            career: "Física".to_string(),
            current_semester: 2,
            credits_completed: 18,
            credits_enrolled: 18,
            status: StudentStatus::Active,
        }
    }

    #[test]
    fn levels_are_summarized_highest_first() {
        let now = Utc::now();
        let predictions = vec![
            prediction(Uuid::new_v4(), 80, now),
            prediction(Uuid::new_v4(), 90, now),
            prediction(Uuid::new_v4(), 10, now),
        ];
        let summaries = summarize_by_level(&predictions);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].level, RiskLevel::High);
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_score - 85.0).abs() < 0.001);
    }

    #[test]
    fn recommendations_are_counted() {
        let now = Utc::now();
        let predictions = vec![prediction(Uuid::new_v4(), 45, now), prediction(Uuid::new_v4(), 30, now)];
        let counts = count_recommendations(&predictions);
        assert_eq!(counts[0], ("study_groups", 2));
        assert!(counts.contains(&("tutoring", 1)));
        assert!(count_recommendations(&[]).is_empty());
    }

    #[test]
    fn report_names_students_and_flags_expired_rows() {
        let now = Utc::now();
        let ana = student("Ana");
        let predictions = vec![
            prediction(ana.id, 75, now),
            prediction(Uuid::new_v4(), 20, now - Duration::days(40)),
        ];
        let report = build_report(&predictions, &[ana], now);

        assert!(report.contains("# Student Retention Report"));
        assert!(report.contains("- high: 1 students (avg score 75.0)"));
        assert!(report.contains("Ana (ana@usm.cl, Física) score 75"));
        assert!(report.contains("1 predictions are past their expiry"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let report = build_report(&[], &[], Utc::now());
        assert!(report.contains("No predictions recorded yet."));
        assert!(report.contains("No students assessed."));
        assert!(!report.contains("past their expiry"));
    }

    #[tokio::test]
    async fn rendered_report_names_inactive_students() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let active = student("Ana");
        let dropped = Student {
            status: StudentStatus::Dropped,
            ..student("Bruno")
        };
        for s in [&active, &dropped] {
            store.upsert_student(s).await.unwrap();
        }
        store.upsert_prediction(&prediction(active.id, 30, now)).await.unwrap();
        store.upsert_prediction(&prediction(dropped.id, 85, now)).await.unwrap();

        let report = render_report(&store, now).await.unwrap();
        assert!(report.contains("Bruno (bruno@usm.cl, Física) score 85"));
        assert!(report.contains("Ana (ana@usm.cl, Física) score 30"));
        assert!(!report.contains(&dropped.id.to_string()));
    }
}
