//! Selection string parser
//!
//! Grammar, per term: `[@][N+][method:]value[+N]`. Terms joined by `,`
//! intersect; whitespace-separated groups union.

use crate::expression::{SelectionCriteria, SelectionExpression};
use crate::method::{Matcher, MethodName};

/// Malformed selection input; always fatal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorSyntaxError {
    #[error("Empty selection string")]
    Empty,

    #[error("Empty term in selector group '{0}'")]
    EmptyTerm(String),

    #[error("Unknown selection method '{method}' in '{term}'")]
    UnknownMethod { method: String, term: String },

    #[error("Missing value in selector term '{0}'")]
    EmptyValue(String),

    #[error("'@' cannot be combined with a leading '+' in '{0}'")]
    AtWithParents(String),

    #[error("Unexpected graph operator in '{0}'")]
    StrayOperator(String),

    #[error("Invalid value in selector term '{term}': {reason}")]
    InvalidValue { term: String, reason: String },
}

/// Parse a single `--select` / `--exclude` value
pub fn parse(text: &str) -> Result<SelectionExpression, SelectorSyntaxError> {
    let groups = text
        .split_whitespace()
        .map(parse_group)
        .collect::<Result<Vec<_>, _>>()?;

    if groups.is_empty() {
        return Err(SelectorSyntaxError::Empty);
    }

    Ok(SelectionExpression::union(groups))
}

/// Parse a repeated flag; all values are unioned. `None` when no values were given.
pub fn parse_many<I, S>(values: I) -> Result<Option<SelectionExpression>, SelectorSyntaxError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut members = Vec::new();
    for value in values {
        match parse(value.as_ref())? {
            SelectionExpression::Union(groups) => members.extend(groups),
            other => members.push(other),
        }
    }

    if members.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SelectionExpression::union(members)))
    }
}

fn parse_group(group: &str) -> Result<SelectionExpression, SelectorSyntaxError> {
    let terms = group
        .split(',')
        .map(|term| {
            if term.is_empty() {
                Err(SelectorSyntaxError::EmptyTerm(group.to_string()))
            } else {
                parse_term(term).map(SelectionExpression::Criteria)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SelectionExpression::intersection(terms))
}

fn parse_depth(digits: &str, term: &str) -> Result<Option<usize>, SelectorSyntaxError> {
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse()
        .map(Some)
        .map_err(|_| SelectorSyntaxError::InvalidValue {
            term: term.to_string(),
            reason: format!("invalid depth '{}'", digits),
        })
}

fn parse_term(term: &str) -> Result<SelectionCriteria, SelectorSyntaxError> {
    let mut rest = term;

    let childrens_parents = rest.starts_with('@');
    if childrens_parents {
        rest = &rest[1..];
    }

    // Leading `N+`; digits not followed by `+` belong to the value
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (parents, parents_depth) = if rest[digits_len..].starts_with('+') {
        let depth = parse_depth(&rest[..digits_len], term)?;
        rest = &rest[digits_len + 1..];
        (true, depth)
    } else {
        (false, None)
    };

    if childrens_parents && parents {
        return Err(SelectorSyntaxError::AtWithParents(term.to_string()));
    }

    // Trailing `+N`
    let (children, children_depth) = match rest.rfind('+') {
        Some(idx) if rest[idx + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            let depth = parse_depth(&rest[idx + 1..], term)?;
            rest = &rest[..idx];
            (true, depth)
        }
        _ => (false, None),
    };

    let (method, value) = match rest.split_once(':') {
        Some((method, value)) => {
            let method = method
                .parse::<MethodName>()
                .map_err(|method| SelectorSyntaxError::UnknownMethod {
                    method,
                    term: term.to_string(),
                })?;
            (method, value)
        }
        None => (MethodName::Fqn, rest),
    };

    if value.is_empty() {
        return Err(SelectorSyntaxError::EmptyValue(term.to_string()));
    }
    if value.contains(['+', '@']) {
        return Err(SelectorSyntaxError::StrayOperator(term.to_string()));
    }

    let matcher = Matcher::compile(method, value, term)?;

    Ok(SelectionCriteria {
        raw: term.to_string(),
        method,
        value: value.to_string(),
        matcher,
        parents,
        parents_depth,
        children,
        children_depth,
        childrens_parents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(text: &str) -> SelectionCriteria {
        match parse(text).unwrap() {
            SelectionExpression::Criteria(criteria) => criteria,
            other => panic!("expected a single term, got {:?}", other),
        }
    }

    #[test]
    fn bare_value_defaults_to_fqn() {
        let criteria = single("descendant_model");
        assert_eq!(criteria.method, MethodName::Fqn);
        assert_eq!(criteria.value, "descendant_model");
        assert!(!criteria.parents && !criteria.children && !criteria.childrens_parents);
    }

    #[test]
    fn graph_operators() {
        let criteria = single("2+source:test_source.test_table+3");
        assert_eq!(criteria.method, MethodName::Source);
        assert_eq!(criteria.value, "test_source.test_table");
        assert!(criteria.parents);
        assert_eq!(criteria.parents_depth, Some(2));
        assert!(criteria.children);
        assert_eq!(criteria.children_depth, Some(3));

        let unbounded = single("+descendant_model+");
        assert_eq!(unbounded.parents_depth, None);
        assert_eq!(unbounded.children_depth, None);
        assert!(unbounded.parents && unbounded.children);

        let at = single("@source:test_source");
        assert!(at.childrens_parents);
        assert!(!at.parents);
    }

    #[test]
    fn leading_digits_without_plus_are_value() {
        let criteria = single("2019_orders");
        assert_eq!(criteria.value, "2019_orders");
        assert!(!criteria.parents);
    }

    #[test]
    fn groups_and_terms() {
        let expr = parse("tag:a,tag:b source:raw").unwrap();
        match &expr {
            SelectionExpression::Union(groups) => {
                assert_eq!(groups.len(), 2);
                assert!(matches!(&groups[0], SelectionExpression::Intersection(t) if t.len() == 2));
                assert!(matches!(&groups[1], SelectionExpression::Criteria(_)));
            }
            other => panic!("expected union, got {:?}", other),
        }
        let values: Vec<_> = expr.criteria().iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "raw"]);
    }

    #[test]
    fn repeated_flags_union() {
        assert_eq!(parse_many(Vec::<String>::new()).unwrap(), None);

        let expr = parse_many(["tag:a", "tag:b tag:c"]).unwrap().unwrap();
        assert!(matches!(expr, SelectionExpression::Union(ref m) if m.len() == 3));
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(parse("").unwrap_err(), SelectorSyntaxError::Empty);
        assert_eq!(parse("a,,b").unwrap_err(), SelectorSyntaxError::EmptyTerm("a,,b".to_string()));
        assert_eq!(parse("a,").unwrap_err(), SelectorSyntaxError::EmptyTerm("a,".to_string()));
        assert_eq!(parse("tag:").unwrap_err(), SelectorSyntaxError::EmptyValue("tag:".to_string()));
        assert_eq!(parse("+").unwrap_err(), SelectorSyntaxError::EmptyValue("+".to_string()));
        assert_eq!(parse("@").unwrap_err(), SelectorSyntaxError::EmptyValue("@".to_string()));
        assert_eq!(
            parse("@+model").unwrap_err(),
            SelectorSyntaxError::AtWithParents("@+model".to_string())
        );
        assert_eq!(
            parse("a+b").unwrap_err(),
            SelectorSyntaxError::StrayOperator("a+b".to_string())
        );
        assert!(matches!(
            parse("bogus:x").unwrap_err(),
            SelectorSyntaxError::UnknownMethod { ref method, .. } if method == "bogus"
        ));
        assert!(matches!(
            parse("resource_type:widget").unwrap_err(),
            SelectorSyntaxError::InvalidValue { .. }
        ));
    }
}
