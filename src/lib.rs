//! expra: an embeddable expression language.
//!
//! Source text is tokenized, parsed into a flat [`Instruction`] sequence and
//! evaluated on an operand stack against a caller-owned [`Variables`] map.
//! Branches of `and`, `or`, `?:` and `case` are nested sub-programs that run
//! only when selected.
//!
//! ```
//! use expra::{Parser, Value, Variables};
//!
//! let parser = Parser::new();
//! let expr = parser.parse("x = 3 * 2 + 1").unwrap();
//! let mut vars = Variables::new();
//! assert_eq!(expr.evaluate(&mut vars).unwrap(), Value::Number(7.0));
//! assert_eq!(vars["x"], Value::Number(7.0));
//! ```

pub mod error;
pub mod interpreter;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod simplify;
pub mod substitute;
pub mod symbols;

pub use error::{Error, ErrorKind, Position, Result};
pub use interpreter::{Function, FunctionId, FunctionRegistry, Value, Variables};
pub use ir::{Expression, Instruction};
pub use parser::{Parser, ParserOptions};

/// Remaining stack below which parser and evaluator recursion switches to a
/// freshly allocated segment.
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each segment allocated by `stacker::maybe_grow`.
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Parse `source` with default options.
pub fn parse(source: &str) -> Result<Expression> {
    parser::parse(source)
}

/// Parse and evaluate `source` with default options.
pub fn evaluate(source: &str, vars: &mut Variables) -> Result<Value> {
    Parser::new().evaluate(source, vars)
}
