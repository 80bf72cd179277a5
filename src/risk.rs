use rand::Rng;

use crate::config::FactorPolicy;
use crate::models::{Recommendations, RiskFactors, RiskLevel, SignalBundle};

pub const MAX_SCORE: u32 = 100;
pub const POINTS_PER_OPEN_ALERT: u32 = 10;

/// Risk score in `0..=100` for one student's signals.
pub fn score(signals: &SignalBundle) -> u32 {
    let alerts = signals.open_alert_count.saturating_mul(POINTS_PER_OPEN_ALERT);
    gpa_points(signals.gpa)
        .saturating_add(attendance_points(signals.attendance_rate))
        .saturating_add(alerts)
        .min(MAX_SCORE)
}

// Bands use strict `<` in ascending order, so a boundary value lands in the
// less severe band above it.
pub fn gpa_points(gpa: f64) -> u32 {
    if gpa < 2.0 {
        40
    } else if gpa < 2.5 {
        25
    } else if gpa < 3.0 {
        15
    } else {
        5
    }
}

pub fn attendance_points(rate: f64) -> u32 {
    if rate < 70.0 {
        30
    } else if rate < 80.0 {
        20
    } else if rate < 90.0 {
        10
    } else {
        0
    }
}

pub fn risk_factors<R: Rng + ?Sized>(
    signals: &SignalBundle,
    score: u32,
    auxiliary: FactorPolicy,
    rng: &mut R,
) -> RiskFactors {
    let gpa = if signals.gpa < 2.5 {
        RiskLevel::High
    } else if signals.gpa < 3.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    // Derived from the overall score, not the raw attendance rate.
    let attendance = if score > 50 {
        RiskLevel::High
    } else if score > 25 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskFactors {
        gpa,
        attendance,
        financial: auxiliary.resolve(rng),
        engagement: auxiliary.resolve(rng),
        social_integration: auxiliary.resolve(rng),
    }
}

pub fn recommendations(score: u32) -> Recommendations {
    Recommendations {
        tutoring: score > 40,
        counseling: score > 60,
        financial_aid: score > 70,
        mentoring: score > 40,
        study_groups: score > 25,
        career_guidance: score > 35,
        psychological_support: score > 70,
    }
}
