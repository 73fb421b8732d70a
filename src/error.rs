use std::fmt;

/// 1-based line/column plus the 0-based byte offset into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Position { line, column, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Access,
    Function,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Unknown character or malformed numeric/string literal.
    #[error("lex error [{position}] {message}")]
    Lex {
        message: String,
        position: Position,
        expression: String,
    },

    /// Unexpected token, disabled operator, bad assignment target, unterminated construct.
    #[error("parse error [{position}] {message}")]
    Parse {
        message: String,
        position: Position,
        expression: String,
    },

    /// Member access disabled, or a prototype-sensitive property name.
    #[error("access error{}: {message}", fmt_position(.position))]
    Access {
        message: String,
        position: Option<Position>,
        expression: Option<String>,
    },

    /// Calling a non-function, or a function outside the sandbox.
    #[error("function error: {message}")]
    Function {
        message: String,
        expression: Option<String>,
    },

    /// Undefined variable, depth ceiling, stack parity and other runtime faults.
    #[error("evaluation error: {message}")]
    Evaluation {
        message: String,
        expression: Option<String>,
    },
}

fn fmt_position(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" [{p}]"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn access(message: impl Into<String>) -> Self {
        Error::Access { message: message.into(), position: None, expression: None }
    }

    pub fn function(message: impl Into<String>) -> Self {
        Error::Function { message: message.into(), expression: None }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation { message: message.into(), expression: None }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lex { .. } => ErrorKind::Lex,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Access { .. } => ErrorKind::Access,
            Error::Function { .. } => ErrorKind::Function,
            Error::Evaluation { .. } => ErrorKind::Evaluation,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Lex { message, .. }
            | Error::Parse { message, .. }
            | Error::Access { message, .. }
            | Error::Function { message, .. }
            | Error::Evaluation { message, .. } => message,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Lex { position, .. } | Error::Parse { position, .. } => Some(*position),
            Error::Access { position, .. } => *position,
            Error::Function { .. } | Error::Evaluation { .. } => None,
        }
    }

    /// The source text of the expression the error belongs to, when known.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Error::Lex { expression, .. } | Error::Parse { expression, .. } => Some(expression),
            Error::Access { expression, .. }
            | Error::Function { expression, .. }
            | Error::Evaluation { expression, .. } => expression.as_deref(),
        }
    }

    /// Attach source text to a runtime error that was raised without it.
    pub fn with_expression(mut self, source: &str) -> Self {
        match &mut self {
            Error::Access { expression, .. }
            | Error::Function { expression, .. }
            | Error::Evaluation { expression, .. } => {
                if expression.is_none() {
                    *expression = Some(source.to_string());
                }
            }
            Error::Lex { .. } | Error::Parse { .. } => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_has_position() {
        let e = Error::Parse {
            message: "unexpected ')'".to_string(),
            position: Position::new(2, 7, 12),
            expression: "1 +\n  2 + )".to_string(),
        };
        assert_eq!(e.to_string(), "parse error [2:7] unexpected ')'");
        assert_eq!(e.kind(), ErrorKind::Parse);
        assert_eq!(e.position(), Some(Position::new(2, 7, 12)));
        assert_eq!(e.expression(), Some("1 +\n  2 + )"));
    }

    #[test]
    fn access_error_display_with_and_without_position() {
        let e = Error::access("prototype access detected");
        assert_eq!(e.to_string(), "access error: prototype access detected");

        let e = Error::Access {
            message: "member access is not permitted".to_string(),
            position: Some(Position::new(1, 2, 1)),
            expression: Some("a.b".to_string()),
        };
        assert_eq!(e.to_string(), "access error [1:2]: member access is not permitted");
    }

    #[test]
    fn with_expression_keeps_existing_source() {
        let e = Error::evaluation("undefined variable: x").with_expression("x + 1");
        assert_eq!(e.expression(), Some("x + 1"));
        let e = e.with_expression("other");
        assert_eq!(e.expression(), Some("x + 1"));
        assert_eq!(e.message(), "undefined variable: x");
        assert!(e.position().is_none());
    }
}
