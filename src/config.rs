use std::str::FromStr;

use anyhow::Context;
use rand::Rng;

use crate::models::RiskLevel;

pub const DEFAULT_MODEL_VERSION: &str = "usm-risk-v1";

/// Upper bound for the attendance window and the prediction lifetime.
pub const MAX_DAYS: i64 = 3650;

/// How the confidence level of a prediction is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfidencePolicy {
    Fixed(f64),
    /// Uniform draw from `min..=max`, used when seeding demo data.
    Sampled { min: f64, max: f64 },
}

impl ConfidencePolicy {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            ConfidencePolicy::Fixed(value) => value,
            ConfidencePolicy::Sampled { min, max } => rng.gen_range(min..=max),
        }
    }
}

impl FromStr for ConfidencePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("sampled") {
            return Ok(ConfidencePolicy::Sampled { min: 0.70, max: 1.00 });
        }
        let fixed: f64 = value
            .parse()
            .with_context(|| format!("confidence must be a number or `sampled`, got `{value}`"))?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&fixed),
            "confidence must be within 0.0..=1.0, got {fixed}"
        );
        Ok(ConfidencePolicy::Fixed(fixed))
    }
}

/// Source of the financial, engagement and social integration factors.
/// No production signal feeds them, so they are either a fixed level or
/// drawn at random for demo data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorPolicy {
    Static(RiskLevel),
    Sampled,
}

impl FactorPolicy {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> RiskLevel {
        match *self {
            FactorPolicy::Static(level) => level,
            FactorPolicy::Sampled => RiskLevel::ALL[rng.gen_range(0..RiskLevel::ALL.len())],
        }
    }
}

impl FromStr for FactorPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("sampled") {
            return Ok(FactorPolicy::Sampled);
        }
        let level = value.parse::<RiskLevel>()?;
        Ok(FactorPolicy::Static(level))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    pub model_version: String,
    pub attendance_window_days: i64,
    /// Used when a student has no attendance in the window.
    pub default_attendance_rate: f64,
    /// Used when a student has no GPA on record.
    pub neutral_gpa: f64,
    pub prediction_ttl_days: i64,
    pub confidence: ConfidencePolicy,
    pub auxiliary_factors: FactorPolicy,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            attendance_window_days: 30,
            default_attendance_rate: 90.0,
            neutral_gpa: 3.0,
            prediction_ttl_days: 30,
            confidence: ConfidencePolicy::Fixed(0.85),
            auxiliary_factors: FactorPolicy::Static(RiskLevel::Medium),
        }
    }
}

impl AssessmentConfig {
    /// Settings for seeded demo data: sampled confidence and auxiliary factors.
    pub fn demo() -> Self {
        Self {
            confidence: ConfidencePolicy::Sampled { min: 0.70, max: 1.00 },
            auxiliary_factors: FactorPolicy::Sampled,
            ..Self::default()
        }
    }

    /// Reads `USM_*` overrides from the environment on top of the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(version) = lookup("USM_MODEL_VERSION") {
            config.model_version = version;
        }
        if let Some(days) = parse_var::<i64>(&lookup, "USM_ATTENDANCE_WINDOW_DAYS")? {
            anyhow::ensure!(
                (1..=MAX_DAYS).contains(&days),
                "USM_ATTENDANCE_WINDOW_DAYS must be within 1..={MAX_DAYS}, got {days}"
            );
            config.attendance_window_days = days;
        }
        if let Some(rate) = parse_var::<f64>(&lookup, "USM_DEFAULT_ATTENDANCE_RATE")? {
            anyhow::ensure!(
                rate.is_finite() && (0.0..=100.0).contains(&rate),
                "USM_DEFAULT_ATTENDANCE_RATE must be within 0..=100, got {rate}"
            );
            config.default_attendance_rate = rate;
        }
        if let Some(gpa) = parse_var::<f64>(&lookup, "USM_NEUTRAL_GPA")? {
            anyhow::ensure!(
                gpa.is_finite() && (0.0..=4.0).contains(&gpa),
                "USM_NEUTRAL_GPA must be within 0.0..=4.0, got {gpa}"
            );
            config.neutral_gpa = gpa;
        }
        if let Some(days) = parse_var::<i64>(&lookup, "USM_PREDICTION_TTL_DAYS")? {
            anyhow::ensure!(
                (1..=MAX_DAYS).contains(&days),
                "USM_PREDICTION_TTL_DAYS must be within 1..={MAX_DAYS}, got {days}"
            );
            config.prediction_ttl_days = days;
        }
        if let Some(policy) = lookup("USM_CONFIDENCE") {
            config.confidence = policy.parse().context("invalid USM_CONFIDENCE")?;
        }
        if let Some(policy) = lookup("USM_AUX_FACTOR") {
            config.auxiliary_factors = policy.parse().context("invalid USM_AUX_FACTOR")?;
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: `{raw}`")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production_path() {
        let config = AssessmentConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AssessmentConfig::default());
        assert_eq!(config.confidence, ConfidencePolicy::Fixed(0.85));
        assert_eq!(config.attendance_window_days, 30);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = AssessmentConfig::from_lookup(lookup_from(&[
            ("USM_MODEL_VERSION", "v2"),
            ("USM_ATTENDANCE_WINDOW_DAYS", "14"),
            ("USM_CONFIDENCE", "sampled"),
            ("USM_AUX_FACTOR", "low"),
        ]))
        .unwrap();
        assert_eq!(config.model_version, "v2");
        assert_eq!(config.attendance_window_days, 14);
        assert!(matches!(config.confidence, ConfidencePolicy::Sampled { .. }));
        assert_eq!(config.auxiliary_factors, FactorPolicy::Static(RiskLevel::Low));
    }

    #[test]
    fn rejects_bad_values() {
        let rejected = [
            ("USM_CONFIDENCE", "1.5"),
            ("USM_NEUTRAL_GPA", "abc"),
            ("USM_NEUTRAL_GPA", "nan"),
            ("USM_NEUTRAL_GPA", "4.5"),
            ("USM_NEUTRAL_GPA", "-1"),
            ("USM_DEFAULT_ATTENDANCE_RATE", "NaN"),
            ("USM_DEFAULT_ATTENDANCE_RATE", "inf"),
            ("USM_DEFAULT_ATTENDANCE_RATE", "101"),
            ("USM_DEFAULT_ATTENDANCE_RATE", "-5"),
            ("USM_ATTENDANCE_WINDOW_DAYS", "0"),
            ("USM_ATTENDANCE_WINDOW_DAYS", "9223372036854775807"),
            ("USM_PREDICTION_TTL_DAYS", "0"),
            ("USM_PREDICTION_TTL_DAYS", "-5"),
            ("USM_PREDICTION_TTL_DAYS", "9223372036854775807"),
        ];
        for (key, value) in rejected {
            assert!(
                AssessmentConfig::from_lookup(lookup_from(&[(key, value)])).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_range_edges() {
        let config = AssessmentConfig::from_lookup(lookup_from(&[
            ("USM_ATTENDANCE_WINDOW_DAYS", "3650"),
            ("USM_PREDICTION_TTL_DAYS", "1"),
            ("USM_DEFAULT_ATTENDANCE_RATE", "0"),
            ("USM_NEUTRAL_GPA", "4.0"),
        ]))
        .unwrap();
        assert_eq!(config.attendance_window_days, MAX_DAYS);
        assert_eq!(config.prediction_ttl_days, 1);
        assert_eq!(config.default_attendance_rate, 0.0);
        assert_eq!(config.neutral_gpa, 4.0);
    }

    #[test]
    fn sampled_confidence_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = ConfidencePolicy::Sampled { min: 0.70, max: 1.00 };
        for _ in 0..200 {
            let value = policy.resolve(&mut rng);
            assert!((0.70..=1.00).contains(&value));
        }
    }
}
