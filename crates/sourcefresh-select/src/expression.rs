//! Parsed selection expressions

use crate::method::{Matcher, MethodName};

/// A single selection term such as `2+tag:nightly+` or `@source:raw`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    /// Term text as written
    pub raw: String,
    pub method: MethodName,
    pub value: String,
    pub matcher: Matcher,

    /// Leading `+`: include ancestors
    pub parents: bool,
    pub parents_depth: Option<usize>,

    /// Trailing `+`: include descendants
    pub children: bool,
    pub children_depth: Option<usize>,

    /// Leading `@`: descendants plus all of their ancestors
    pub childrens_parents: bool,
}

/// Operator tree produced by the parser
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionExpression {
    Criteria(SelectionCriteria),
    Intersection(Vec<SelectionExpression>),
    Union(Vec<SelectionExpression>),
}

impl SelectionExpression {
    /// Collapse single-member unions and intersections
    pub(crate) fn union(mut members: Vec<SelectionExpression>) -> Self {
        if members.len() == 1 {
            members.remove(0)
        } else {
            Self::Union(members)
        }
    }

    pub(crate) fn intersection(mut members: Vec<SelectionExpression>) -> Self {
        if members.len() == 1 {
            members.remove(0)
        } else {
            Self::Intersection(members)
        }
    }

    /// All leaf terms, in source order
    pub fn criteria(&self) -> Vec<&SelectionCriteria> {
        match self {
            Self::Criteria(criteria) => vec![criteria],
            Self::Intersection(members) | Self::Union(members) => {
                members.iter().flat_map(|m| m.criteria()).collect()
            }
        }
    }
}
