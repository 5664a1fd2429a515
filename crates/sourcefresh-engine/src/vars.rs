//! `--vars` handling for loaded-at expressions and filters
//!
//! Freshness configuration may reference project variables as
//! `{{ var('name') }}` or `{{ var('name', 'default') }}`. Templates are
//! rendered with MiniJinja; undefined names are errors rather than empty
//! strings.

use minijinja::{context, Environment, Error, ErrorKind, UndefinedBehavior, Value as JinjaValue};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VarsError {
    #[error("Failed to parse --vars as YAML: {0}")]
    ParseError(String),

    #[error("--vars must be a YAML mapping")]
    NotAMapping,

    #[error("Required var '{0}' not found in --vars and has no default")]
    Undefined(String),

    #[error("Failed to render template: {0}")]
    Render(String),
}

/// Variables passed on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectVars {
    values: BTreeMap<String, Value>,
}

impl ProjectVars {
    /// Parse a YAML mapping such as `{"table_name": "orders", "days": 3}`
    pub fn from_yaml(yaml: &str) -> Result<Self, VarsError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let parsed: Value =
            serde_yaml_ng::from_str(yaml).map_err(|e| VarsError::ParseError(e.to_string()))?;

        let mapping = match parsed {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Ok(Self::default()),
            _ => return Err(VarsError::NotAMapping),
        };

        let values = mapping
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(key) => Ok((key, value)),
                _ => Err(VarsError::NotAMapping),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check if a string contains Jinja syntax
    pub fn has_jinja(template: &str) -> bool {
        template.contains("{{") || template.contains("{%") || template.contains("{#")
    }

    /// Render `template` with `var()` bound to these values
    pub fn render(&self, template: &str) -> Result<String, VarsError> {
        if !Self::has_jinja(template) {
            return Ok(template.to_string());
        }

        self.environment()
            .render_str(template, context! {})
            .map_err(|e| match (e.kind(), e.detail()) {
                (ErrorKind::UndefinedError, Some(name)) => VarsError::Undefined(name.to_string()),
                _ => VarsError::Render(e.to_string()),
            })
    }

    fn environment(&self) -> Environment<'static> {
        let values: BTreeMap<String, JinjaValue> = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), JinjaValue::from_serialize(value)))
            .collect();

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_function("var", move |name: String, default: Option<JinjaValue>| -> Result<JinjaValue, Error> {
            match (values.get(&name), default) {
                (Some(value), _) => Ok(value.clone()),
                (None, Some(default)) => Ok(default),
                // detail carries the bare name for VarsError::Undefined
                (None, None) => Err(Error::new(ErrorKind::UndefinedError, name)),
            }
        });
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_var_references() {
        let vars = ProjectVars::from_yaml("{test_run_schema: analytics, days: 3}").unwrap();
        assert_eq!(vars.render("updated_at").unwrap(), "updated_at");
        assert_eq!(
            vars.render("convert_tz({{ var('test_run_schema') }}.updated_at)").unwrap(),
            "convert_tz(analytics.updated_at)"
        );
        assert_eq!(
            vars.render("age < {{var(\"days\")}} and x = '{{ var('missing', 'dflt') }}'").unwrap(),
            "age < 3 and x = 'dflt'"
        );
        assert_eq!(vars.render("{{ var('missing', 7) }}").unwrap(), "7");
    }

    #[test]
    fn quoted_braces_in_defaults() {
        let vars = ProjectVars::default();
        assert_eq!(vars.render("x = '{{ var('close', '}}') }}'").unwrap(), "x = '}}'");
        assert_eq!(vars.render("{{ var('a', 'x, y') }}").unwrap(), "x, y");
    }

    #[test]
    fn undefined_and_invalid_templates() {
        let vars = ProjectVars::default();
        assert_eq!(
            vars.render("{{ var('nope') }}").unwrap_err(),
            VarsError::Undefined("nope".to_string())
        );
        assert!(matches!(vars.render("{{ env_var('X') }}"), Err(VarsError::Render(_))));
        assert!(matches!(vars.render("{{ var('x')"), Err(VarsError::Render(_))));
        assert!(matches!(vars.render("{{ other_name }}"), Err(VarsError::Render(_))));
    }

    #[test]
    fn yaml_shapes() {
        assert!(ProjectVars::from_yaml("").unwrap().is_empty());
        assert_eq!(ProjectVars::from_yaml("[1, 2]").unwrap_err(), VarsError::NotAMapping);
        assert!(matches!(ProjectVars::from_yaml("{a: [}"), Err(VarsError::ParseError(_))));

        let vars = ProjectVars::from_yaml("flag: true\nids: [1, 2]\n").unwrap();
        assert_eq!(vars.render("{{ var('flag') }}").unwrap(), "true");
        assert_eq!(vars.render("{{ var('ids') | join(',') }}").unwrap(), "1,2");
    }
}
