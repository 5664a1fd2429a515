//! Freshness criteria resolution
//!
//! Merges the node override (`config.freshness`), the table declaration
//! (`freshness`) and the source default (`source_freshness`) into one
//! effective criteria object. Each key resolves independently, highest
//! level first:
//! - key absent at a level: fall through to the next level
//! - key set to `null`: resolves to absent, lower levels are ignored
//! - key set to a value: that value wins
//!
//! A whole level set to `null` acts as `null` for every key.

use sourcefresh_core::{FreshnessCriteria, FreshnessDeclaration};
use sourcefresh_dbt::ManifestSource;

/// Why a source is skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    /// Neither `warn_after` nor `error_after` survived the merge
    NoThresholds,
    /// Thresholds exist but there is no column to measure
    NoLoadedAtField,
}

impl std::fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoThresholds => write!(f, "no freshness thresholds configured"),
            Self::NoLoadedAtField => write!(f, "no loaded_at_field configured"),
        }
    }
}

/// Outcome of resolving one source
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFreshness {
    Enabled {
        criteria: FreshnessCriteria,
        loaded_at_field: String,
    },
    Disabled(DisabledReason),
}

impl ResolvedFreshness {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

type Level<'a> = &'a Option<Option<FreshnessDeclaration>>;

pub struct CriteriaResolver;

impl CriteriaResolver {
    /// Resolve the effective freshness configuration of a source
    pub fn resolve(source: &ManifestSource) -> ResolvedFreshness {
        let criteria = Self::merge([
            &source.config.freshness,
            &source.freshness,
            &source.source_freshness,
        ]);

        if !criteria.has_thresholds() {
            return ResolvedFreshness::Disabled(DisabledReason::NoThresholds);
        }

        let loaded_at_field = [&source.loaded_at_field, &source.source_loaded_at_field]
            .into_iter()
            .flatten()
            .map(|field| field.trim())
            .find(|field| !field.is_empty());

        match loaded_at_field {
            Some(field) => ResolvedFreshness::Enabled {
                criteria,
                loaded_at_field: field.to_string(),
            },
            None => ResolvedFreshness::Disabled(DisabledReason::NoLoadedAtField),
        }
    }

    /// Merge declaration levels, highest precedence first
    pub fn merge<const N: usize>(levels: [Level<'_>; N]) -> FreshnessCriteria {
        FreshnessCriteria {
            warn_after: Self::resolve_key(&levels, |d| &d.warn_after),
            error_after: Self::resolve_key(&levels, |d| &d.error_after),
            filter: Self::resolve_key(&levels, |d| &d.filter),
        }
    }

    fn resolve_key<T: Clone>(
        levels: &[Level<'_>],
        key: impl Fn(&FreshnessDeclaration) -> &Option<Option<T>>,
    ) -> Option<T> {
        for level in levels {
            match level {
                None => continue,
                Some(None) => return None,
                Some(Some(declaration)) => match key(declaration) {
                    None => continue,
                    Some(value) => return value.clone(),
                },
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sourcefresh_core::Threshold;
    use sourcefresh_dbt::Manifest;

    fn source(levels: &str) -> ManifestSource {
        let json = format!(
            r#"{{
                "sources": {{
                    "source.test.test_source.test_table": {{
                        "unique_id": "source.test.test_source.test_table",
                        "source_name": "test_source",
                        "name": "test_table",
                        "schema": "analytics",
                        "loaded_at_field": "updated_at",
                        {}
                    }}
                }}
            }}"#,
            levels
        );
        Manifest::from_json(&json)
            .unwrap()
            .sources
            .remove("source.test.test_source.test_table")
            .unwrap()
    }

    fn enabled(resolved: ResolvedFreshness) -> FreshnessCriteria {
        match resolved {
            ResolvedFreshness::Enabled { criteria, .. } => criteria,
            other => panic!("expected enabled criteria, got {:?}", other),
        }
    }

    #[test]
    fn source_level_defaults_apply() {
        let src = source(
            r#""source_freshness": {"warn_after": {"count": 10, "period": "hour"}, "error_after": {"count": 18, "period": "hour"}}"#,
        );
        assert_eq!(
            enabled(CriteriaResolver::resolve(&src)),
            FreshnessCriteria::new(Some(Threshold::hours(10)), Some(Threshold::hours(18)))
        );
    }

    #[test]
    fn keys_merge_independently() {
        let src = source(
            r#""source_freshness": {"warn_after": {"count": 10, "period": "hour"}, "error_after": {"count": 18, "period": "hour"}, "filter": "id > 1"},
               "freshness": {"error_after": {"count": 1, "period": "day"}},
               "config": {"freshness": {"warn_after": {"count": 30, "period": "minute"}}}"#,
        );
        assert_eq!(
            enabled(CriteriaResolver::resolve(&src)),
            FreshnessCriteria::new(Some(Threshold::minutes(30)), Some(Threshold::days(1)))
                .with_filter("id > 1")
        );
    }

    #[test]
    fn explicit_null_key_stops_inheritance() {
        let src = source(
            r#""source_freshness": {"warn_after": {"count": 10, "period": "hour"}, "error_after": {"count": 18, "period": "hour"}},
               "freshness": {"error_after": null}"#,
        );
        assert_eq!(
            enabled(CriteriaResolver::resolve(&src)),
            FreshnessCriteria::new(Some(Threshold::hours(10)), None)
        );
    }

    #[test]
    fn null_table_level_disables() {
        let src = source(
            r#""source_freshness": {"warn_after": {"count": 10, "period": "hour"}},
               "freshness": null"#,
        );
        assert_eq!(
            CriteriaResolver::resolve(&src),
            ResolvedFreshness::Disabled(DisabledReason::NoThresholds)
        );
    }

    #[test]
    fn override_can_reenable_after_null_table() {
        let src = source(
            r#""freshness": null,
               "config": {"freshness": {"warn_after": {"count": 6, "period": "hour"}}}"#,
        );
        assert_eq!(
            enabled(CriteriaResolver::resolve(&src)),
            FreshnessCriteria::new(Some(Threshold::hours(6)), None)
        );
    }

    #[test]
    fn missing_loaded_at_field_disables() {
        let mut src = source(r#""freshness": {"warn_after": {"count": 6, "period": "hour"}}"#);
        src.loaded_at_field = None;
        assert_eq!(
            CriteriaResolver::resolve(&src),
            ResolvedFreshness::Disabled(DisabledReason::NoLoadedAtField)
        );

        src.source_loaded_at_field = Some("_etl_loaded_at".to_string());
        match CriteriaResolver::resolve(&src) {
            ResolvedFreshness::Enabled { loaded_at_field, .. } => assert_eq!(loaded_at_field, "_etl_loaded_at"),
            other => panic!("expected enabled, got {:?}", other),
        }
    }

    #[test]
    fn nothing_declared_is_disabled() {
        let src = source(r#""tags": []"#);
        assert!(!CriteriaResolver::resolve(&src).is_enabled());
    }
}
