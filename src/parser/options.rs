use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::interpreter::ops;
use crate::lexer::OpContext;

pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parser configuration. Immutable once handed to a [`Parser`](super::Parser).
///
/// Deserializes from `{ "allowMemberAccess": bool, "operators": { name: bool } }`;
/// operators not listed are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    pub allow_member_access: bool,
    pub operators: BTreeMap<String, bool>,
    /// Nesting ceiling for parsing and for sub-program/closure evaluation.
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            allow_member_access: true,
            operators: BTreeMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParserOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_operator(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.operators.insert(name.into(), enabled);
        self
    }

    pub fn with_member_access(mut self, allow: bool) -> Self {
        self.allow_member_access = allow;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Look up an option by its configuration name (`add`, `logical`, `sin`, ...).
    pub fn operator_enabled(&self, option: &str) -> bool {
        self.operators.get(option).copied().unwrap_or(true)
    }

    /// Whether the operator spelled `symbol`, used in `context`, may be parsed.
    pub fn is_operator_enabled(&self, symbol: &str, context: OpContext) -> bool {
        match option_name(symbol, context) {
            Some(option) => self.operator_enabled(option),
            None => true,
        }
    }

    /// Function definition needs both its own switch and assignment.
    pub fn fndef_enabled(&self) -> bool {
        self.operator_enabled("fndef") && self.operator_enabled("assignment")
    }

    pub fn conditional_enabled(&self) -> bool {
        self.operator_enabled("conditional")
    }

    pub fn array_enabled(&self) -> bool {
        self.operator_enabled("array")
    }

    /// A named unary operator that is switched on.
    pub fn is_prefix_op(&self, name: &str) -> bool {
        ops::named_unary(name).is_some() && self.is_operator_enabled(name, OpContext::Prefix)
    }
}

/// Configuration name controlling `symbol` in `context`.
pub fn option_name(symbol: &str, context: OpContext) -> Option<&str> {
    let name = match (context, symbol) {
        (OpContext::Infix | OpContext::Prefix, "+") => "add",
        (OpContext::Infix | OpContext::Prefix, "-") => "subtract",
        (OpContext::Infix, "*") => "multiply",
        (OpContext::Infix, "/") => "divide",
        (OpContext::Infix, "%") => "remainder",
        (OpContext::Infix, "^") => "power",
        (OpContext::Infix, "==" | "!=" | "<" | "<=" | ">" | ">=") => "comparison",
        (OpContext::Infix, "||") => "concatenate",
        (OpContext::Infix, "and" | "or") | (OpContext::Prefix, "not") => "logical",
        (OpContext::Infix, "?" | ":") => "conditional",
        (OpContext::Infix, "in") => "in",
        (OpContext::Infix, "=") => "assignment",
        (OpContext::Postfix, "!") => "factorial",
        (OpContext::Prefix, named) if ops::named_unary(named).is_some() => return Some(symbol),
        _ => return None,
    };
    Some(name)
}
