//! Freshness criteria and status types
//!
//! `FreshnessCriteria` is the resolved, effective criteria for one source.
//! `FreshnessDeclaration` is what a single configuration level says before
//! merging; every key there distinguishes "unset" from "explicitly null".

use serde::{Deserialize, Deserializer, Serialize};

/// Unit of a freshness threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Minute,
    Hour,
    Day,
}

impl TimePeriod {
    /// Length of one period in seconds
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 60 * 60 * 24,
        }
    }
}

impl std::fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// A `{count, period}` staleness threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Threshold {
    /// Number of periods (must be > 0)
    pub count: u32,

    /// Period unit
    pub period: TimePeriod,
}

impl Threshold {
    pub fn new(count: u32, period: TimePeriod) -> Self {
        Self { count, period }
    }

    pub fn minutes(count: u32) -> Self {
        Self::new(count, TimePeriod::Minute)
    }

    pub fn hours(count: u32) -> Self {
        Self::new(count, TimePeriod::Hour)
    }

    pub fn days(count: u32) -> Self {
        Self::new(count, TimePeriod::Day)
    }

    /// Threshold length in seconds
    pub fn seconds(&self) -> f64 {
        (u64::from(self.count) * self.period.seconds()) as f64
    }

    /// True when `age_seconds` is strictly past this threshold
    pub fn is_exceeded_by(&self, age_seconds: f64) -> bool {
        age_seconds > self.seconds()
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.count, self.period)
    }
}

/// Outcome of a freshness check
///
/// Variants are ordered by severity, so `max()` over a run gives the worst.
/// The serialized names are part of the sources.json format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FreshnessStatus {
    #[serde(rename = "pass")]
    Pass,

    #[serde(rename = "warn")]
    Warn,

    #[serde(rename = "error")]
    Error,

    #[serde(rename = "runtime error")]
    RuntimeError,
}

impl FreshnessStatus {
    /// Whether this status fails the command
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::RuntimeError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::RuntimeError => "runtime error",
        }
    }
}

impl std::fmt::Display for FreshnessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective criteria for one source after merging all configuration levels
///
/// Serialized verbatim into each result's `criteria` field; absent keys are
/// written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessCriteria {
    pub warn_after: Option<Threshold>,
    pub error_after: Option<Threshold>,
    pub filter: Option<String>,
}

impl FreshnessCriteria {
    pub fn new(warn_after: Option<Threshold>, error_after: Option<Threshold>) -> Self {
        Self {
            warn_after,
            error_after,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// A criteria object with no threshold never produces a status
    pub fn has_thresholds(&self) -> bool {
        self.warn_after.is_some() || self.error_after.is_some()
    }

    /// Classify an age against the thresholds.
    ///
    /// `error_after` is checked before `warn_after`; an unset threshold makes
    /// its tier unreachable.
    pub fn classify(&self, age_seconds: f64) -> FreshnessStatus {
        if self
            .error_after
            .is_some_and(|threshold| threshold.is_exceeded_by(age_seconds))
        {
            return FreshnessStatus::Error;
        }

        if self
            .warn_after
            .is_some_and(|threshold| threshold.is_exceeded_by(age_seconds))
        {
            return FreshnessStatus::Warn;
        }

        FreshnessStatus::Pass
    }
}

/// Freshness as declared at one configuration level (source, table, or
/// node override), before merging.
///
/// `None` means the key was not written at this level and is inherited.
/// `Some(None)` means it was written as `null` and inheritance stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessDeclaration {
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub warn_after: Option<Option<Threshold>>,

    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub error_after: Option<Option<Threshold>>,

    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Option<String>>,
}

impl FreshnessDeclaration {
    /// A declaration that sets every key to null
    pub fn disabled() -> Self {
        Self {
            warn_after: Some(None),
            error_after: Some(None),
            filter: Some(None),
        }
    }

    pub fn warn_after(mut self, threshold: Option<Threshold>) -> Self {
        self.warn_after = Some(threshold);
        self
    }

    pub fn error_after(mut self, threshold: Option<Threshold>) -> Self {
        self.error_after = Some(threshold);
        self
    }

    pub fn filter(mut self, filter: Option<&str>) -> Self {
        self.filter = Some(filter.map(str::to_string));
        self
    }

    /// Thresholds written at this level
    pub fn thresholds(&self) -> impl Iterator<Item = &Threshold> {
        [&self.warn_after, &self.error_after]
            .into_iter()
            .filter_map(|t| t.as_ref().and_then(Option::as_ref))
    }
}

/// Deserialize a present field (even `null`) as `Some(..)`.
///
/// Paired with `#[serde(default)]` this separates a missing key (`None`)
/// from an explicit `null` (`Some(None)`).
pub fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_seconds() {
        assert_eq!(Threshold::minutes(2).seconds(), 120.0);
        assert_eq!(Threshold::hours(10).seconds(), 36_000.0);
        assert_eq!(Threshold::days(1).seconds(), 86_400.0);
    }

    #[test]
    fn error_checked_before_warn() {
        let criteria = FreshnessCriteria::new(Some(Threshold::hours(10)), Some(Threshold::hours(18)));

        assert_eq!(criteria.classify(2.0 * 3600.0), FreshnessStatus::Pass);
        assert_eq!(criteria.classify(12.0 * 3600.0), FreshnessStatus::Warn);
        assert_eq!(criteria.classify(30.0 * 3600.0), FreshnessStatus::Error);
    }

    #[test]
    fn threshold_is_strict() {
        let criteria = FreshnessCriteria::new(Some(Threshold::hours(1)), None);
        assert_eq!(criteria.classify(3600.0), FreshnessStatus::Pass);
        assert_eq!(criteria.classify(3600.5), FreshnessStatus::Warn);
    }

    #[test]
    fn warn_only_never_errors() {
        let criteria = FreshnessCriteria::new(Some(Threshold::minutes(1)), None);
        for age in [0.0, 61.0, 1e6, 1e12] {
            assert_ne!(criteria.classify(age), FreshnessStatus::Error);
        }
    }

    #[test]
    fn error_only_never_warns() {
        let criteria = FreshnessCriteria::new(None, Some(Threshold::days(1)));
        assert_eq!(criteria.classify(3600.0), FreshnessStatus::Pass);
        assert_eq!(criteria.classify(2.0 * 86_400.0), FreshnessStatus::Error);
    }

    #[test]
    fn status_ordering_and_names() {
        assert!(FreshnessStatus::RuntimeError > FreshnessStatus::Error);
        assert!(FreshnessStatus::Error > FreshnessStatus::Warn);
        assert!(FreshnessStatus::Warn > FreshnessStatus::Pass);
        assert!(!FreshnessStatus::Warn.is_failure());
        assert!(FreshnessStatus::RuntimeError.is_failure());

        let json = serde_json::to_string(&FreshnessStatus::RuntimeError).unwrap();
        assert_eq!(json, "\"runtime error\"");
    }

    #[test]
    fn criteria_serializes_nulls() {
        let criteria = FreshnessCriteria::new(Some(Threshold::hours(6)), None);
        let value = serde_json::to_value(&criteria).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "warn_after": {"count": 6, "period": "hour"},
                "error_after": null,
                "filter": null,
            })
        );
    }

    #[test]
    fn declaration_separates_missing_from_null() {
        let decl: FreshnessDeclaration = serde_json::from_str(
            r#"{"warn_after": {"count": 6, "period": "hour"}, "error_after": null}"#,
        )
        .unwrap();

        assert_eq!(decl.warn_after, Some(Some(Threshold::hours(6))));
        assert_eq!(decl.error_after, Some(None));
        assert_eq!(decl.filter, None);
        assert_eq!(decl.thresholds().count(), 1);
    }

    #[test]
    fn zero_count_parses_but_negative_does_not() {
        assert!(serde_json::from_str::<Threshold>(r#"{"count": 0, "period": "day"}"#).is_ok());
        assert!(serde_json::from_str::<Threshold>(r#"{"count": -1, "period": "day"}"#).is_err());
        assert!(serde_json::from_str::<Threshold>(r#"{"count": 1, "period": "week"}"#).is_err());
    }
}
