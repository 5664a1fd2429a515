//! Custom environment capture for report metadata
//!
//! Variables whose names start with the configured prefix are copied into
//! `metadata.env` with the prefix stripped. Capture reads only the iterator
//! it is given; `capture_process_env` is the one place that touches the
//! process environment.
//!
//! Key casing: when `case_insensitive` is in effect (default on Windows,
//! where the environment is case-insensitive) the prefix is matched ignoring
//! case and captured keys are upper-cased. Elsewhere keys are kept verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default prefix marking variables for capture
pub const DEFAULT_CUSTOM_ENV_PREFIX: &str = "DBT_ENV_CUSTOM_ENV_";

/// Which environment variables end up in report metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvCaptureConfig {
    /// Name prefix marking variables for capture
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Override for case normalization; platform default when unset
    #[serde(default)]
    pub case_insensitive: Option<bool>,
}

fn default_prefix() -> String {
    DEFAULT_CUSTOM_ENV_PREFIX.to_string()
}

impl Default for EnvCaptureConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            case_insensitive: None,
        }
    }
}

impl EnvCaptureConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = Some(case_insensitive);
        self
    }

    /// Whether keys are matched case-insensitively and upper-cased
    pub fn normalizes_case(&self) -> bool {
        self.case_insensitive.unwrap_or(cfg!(windows))
    }

    /// Capture matching variables from `vars`
    pub fn capture<I, K, V>(&self, vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let normalize = self.normalizes_case();
        let prefix = if normalize {
            self.prefix.to_uppercase()
        } else {
            self.prefix.clone()
        };

        let mut captured = BTreeMap::new();
        for (name, value) in vars {
            let name = name.as_ref();
            let candidate = if normalize {
                name.to_uppercase()
            } else {
                name.to_string()
            };

            let Some(stripped) = candidate.strip_prefix(&prefix) else {
                continue;
            };

            if stripped.is_empty() {
                continue;
            }

            captured.insert(stripped.to_string(), value.into());
        }

        captured
    }

    /// Capture from the current process environment.
    ///
    /// Variables that are not valid unicode are skipped.
    pub fn capture_process_env(&self) -> BTreeMap<String, String> {
        let vars = std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        self.capture(vars)
    }
}
