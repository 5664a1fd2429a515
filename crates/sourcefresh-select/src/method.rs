//! Selection methods and value matching

use regex::Regex;
use sourcefresh_dbt::{GraphNode, ResourceType};
use std::str::FromStr;

use crate::parser::SelectorSyntaxError;

/// Selection method (the part before `:` in a term)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodName {
    Fqn,
    Tag,
    Source,
    ResourceType,
    UniqueId,
}

impl MethodName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fqn => "fqn",
            Self::Tag => "tag",
            Self::Source => "source",
            Self::ResourceType => "resource_type",
            Self::UniqueId => "unique_id",
        }
    }
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fqn" => Ok(Self::Fqn),
            "tag" => Ok(Self::Tag),
            "source" => Ok(Self::Source),
            "resource_type" => Ok(Self::ResourceType),
            "unique_id" => Ok(Self::UniqueId),
            other => Err(other.to_string()),
        }
    }
}

/// A literal value, or a glob when it contains `*` or `?`
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Option<Regex>,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self, regex::Error> {
        let regex = if raw.contains(['*', '?']) {
            let mut expr = String::with_capacity(raw.len() + 8);
            expr.push('^');
            for ch in raw.chars() {
                match ch {
                    '*' => expr.push_str(".*"),
                    '?' => expr.push('.'),
                    other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                }
            }
            expr.push('$');
            Some(Regex::new(&expr)?)
        } else {
            None
        };

        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None => self.raw == candidate,
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// A compiled method + value pair that tests a single graph node
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Dotted fqn prefix, or a bare node name
    Fqn(Vec<Pattern>),
    Tag(Pattern),
    Source {
        package: Option<Pattern>,
        source: Pattern,
        table: Option<Pattern>,
    },
    ResourceType(ResourceType),
    UniqueId(Pattern),
}

impl Matcher {
    pub fn compile(method: MethodName, value: &str, term: &str) -> Result<Self, SelectorSyntaxError> {
        let pattern = |raw: &str| {
            Pattern::new(raw).map_err(|e| SelectorSyntaxError::InvalidValue {
                term: term.to_string(),
                reason: e.to_string(),
            })
        };

        match method {
            MethodName::Fqn => {
                let parts = value.split('.').map(pattern).collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Fqn(parts))
            }
            MethodName::Tag => Ok(Self::Tag(pattern(value)?)),
            MethodName::UniqueId => Ok(Self::UniqueId(pattern(value)?)),
            MethodName::ResourceType => value
                .parse::<ResourceType>()
                .map(Self::ResourceType)
                .map_err(|reason| SelectorSyntaxError::InvalidValue {
                    term: term.to_string(),
                    reason,
                }),
            MethodName::Source => {
                let parts: Vec<&str> = value.split('.').collect();
                match parts.as_slice() {
                    [source] => Ok(Self::Source {
                        package: None,
                        source: pattern(source)?,
                        table: None,
                    }),
                    [source, table] => Ok(Self::Source {
                        package: None,
                        source: pattern(source)?,
                        table: Some(pattern(table)?),
                    }),
                    [package, source, table] => Ok(Self::Source {
                        package: Some(pattern(package)?),
                        source: pattern(source)?,
                        table: Some(pattern(table)?),
                    }),
                    _ => Err(SelectorSyntaxError::InvalidValue {
                        term: term.to_string(),
                        reason: "expected source, source.table or package.source.table".to_string(),
                    }),
                }
            }
        }
    }

    pub fn matches(&self, node: &GraphNode) -> bool {
        match self {
            Self::Fqn(parts) => {
                // sources are reached through `source:`
                if node.resource_type == ResourceType::Source {
                    return false;
                }
                if let [single] = parts.as_slice() {
                    if single.is_match(&node.name) {
                        return true;
                    }
                }
                parts.len() <= node.fqn.len()
                    && parts.iter().zip(&node.fqn).all(|(p, segment)| p.is_match(segment))
            }
            Self::Tag(pattern) => node.tags.iter().any(|tag| pattern.is_match(tag)),
            Self::Source {
                package,
                source,
                table,
            } => {
                let Some(source_name) = node.source_name.as_deref() else {
                    return false;
                };
                node.resource_type == ResourceType::Source
                    && source.is_match(source_name)
                    && table.as_ref().map_or(true, |t| t.is_match(&node.name))
                    && package.as_ref().map_or(true, |p| p.is_match(&node.package_name))
            }
            Self::ResourceType(resource_type) => node.resource_type == *resource_type,
            Self::UniqueId(pattern) => pattern.is_match(&node.unique_id),
        }
    }
}
