use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::interpreter::{self, FunctionRegistry, Value, Variables};
use crate::parser::ParserOptions;

pub mod fmt_expr;

// ---- Instructions ----

/// One stack operation. Nested `Expr` sub-programs are the only recursion and
/// are evaluated only when the surrounding instruction asks for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Literal(Value),
    Unary(String),
    Binary(String),
    Ternary(String),
    Var(String),
    /// Assignment or parameter target; pushes the name, not its value.
    VarName(String),
    /// Argument count.
    Call(usize),
    /// Parameter count.
    FunctionDef(usize),
    Expr(Vec<Instruction>),
    Member(String),
    /// Element count.
    Array(usize),
    ObjectStart,
    Property(String),
    ObjectEnd,
    /// `case when ...` without a subject.
    CaseCondition { arms: usize, has_else: bool },
    /// `case subject when ...`
    CaseMatch { arms: usize, has_else: bool },
    EndStatement,
    Undefined,
}

impl Instruction {
    pub fn number(n: f64) -> Self {
        Instruction::Literal(Value::Number(n))
    }
}

// ---- Compiled expression ----

/// A parsed expression: an immutable instruction sequence plus the parser
/// configuration and function registry it was compiled against.
#[derive(Debug, Clone)]
pub struct Expression {
    instructions: Vec<Instruction>,
    options: Arc<ParserOptions>,
    functions: Arc<FunctionRegistry>,
    source: Option<Arc<str>>,
}

impl Expression {
    pub(crate) fn new(
        instructions: Vec<Instruction>,
        options: Arc<ParserOptions>,
        functions: Arc<FunctionRegistry>,
        source: Option<Arc<str>>,
    ) -> Self {
        Expression { instructions, options, functions, source }
    }

    /// Same configuration, different instructions. Transforms keep the source
    /// text only when the instructions are unchanged.
    fn derive(&self, instructions: Vec<Instruction>) -> Self {
        let source = if instructions == self.instructions { self.source.clone() } else { None };
        Expression {
            instructions,
            options: Arc::clone(&self.options),
            functions: Arc::clone(&self.functions),
            source,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// The text this expression was parsed from, when it still corresponds.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Run against `vars`. Assignments and function definitions write through.
    pub fn evaluate(&self, vars: &mut Variables) -> Result<Value> {
        interpreter::evaluate(&self.instructions, &self.options, &self.functions, vars).map_err(
            |e| match self.source() {
                Some(source) => e.with_expression(source),
                None => e,
            },
        )
    }

    /// Fold every operation whose operands are known, treating `values` as constants.
    pub fn simplify(&self, values: &Variables) -> Expression {
        let simplified = crate::simplify::simplify(&self.instructions, values, &self.options);
        tracing::debug!(
            before = self.instructions.len(),
            after = simplified.len(),
            "simplified expression"
        );
        self.derive(simplified)
    }

    /// Replace every reference to `variable` with a copy of `with`.
    pub fn substitute(&self, variable: &str, with: &Expression) -> Expression {
        tracing::debug!(variable, "substituting variable");
        self.derive(crate::substitute::substitute(&self.instructions, variable, &with.instructions))
    }

    /// Free names in first-use order. With `with_members`, `a.b.c` is reported whole.
    pub fn symbols(&self, with_members: bool) -> Vec<String> {
        crate::symbols::symbols(&self.instructions, with_members)
    }

    /// Like [`Expression::symbols`], without names of registered functions.
    pub fn variables(&self, with_members: bool) -> Vec<String> {
        crate::symbols::variables(&self.instructions, with_members, &self.functions)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.instructions == other.instructions
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fmt_expr::format(&self.instructions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn derive_drops_stale_source() {
        let expr = Parser::new().parse("x + 1").unwrap();
        assert_eq!(expr.source(), Some("x + 1"));
        let same = expr.simplify(&Variables::new());
        assert_eq!(same.source(), Some("x + 1"));
        let vars: Variables = [("x".to_string(), Value::Number(2.0))].into_iter().collect();
        let folded = expr.simplify(&vars);
        assert_eq!(folded.source(), None);
        assert_eq!(folded.instructions(), &[Instruction::number(3.0)]);
    }

    #[test]
    fn evaluate_errors_carry_source() {
        let expr = Parser::new().parse("missing * 2").unwrap();
        let err = expr.evaluate(&mut Variables::new()).unwrap_err();
        assert_eq!(err.expression(), Some("missing * 2"));
        assert_eq!(err.message(), "undefined variable: missing");
    }
}
