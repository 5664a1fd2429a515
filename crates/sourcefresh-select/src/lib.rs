//! Node selection grammar
//!
//! Parses `--select` / `--exclude` strings into selection expressions and
//! evaluates them against the dependency graph.

pub mod expression;
pub mod method;
pub mod parser;
pub mod selector;

pub use expression::{SelectionCriteria, SelectionExpression};
pub use method::{Matcher, MethodName, Pattern};
pub use parser::{parse, parse_many, SelectorSyntaxError};
pub use selector::{NodeSelector, SelectionPurpose};
