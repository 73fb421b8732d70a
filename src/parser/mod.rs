use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::interpreter::{FunctionId, FunctionRegistry, Value, Variables, format_number, ops};
use crate::ir::{Expression, Instruction};
use crate::lexer::{OpContext, Token, TokenKind, TokenStream};
use crate::{STACK_GROW_SIZE, STACK_RED_ZONE};

mod assign;
mod branch;
pub mod options;
mod statement;

pub use options::ParserOptions;

// ---- Public entry ----

/// Compiles expression text into [`Expression`]s.
///
/// Holds the operator configuration, the function registry handed to every
/// expression it produces, and the constant table.
#[derive(Debug, Clone)]
pub struct Parser {
    options: Arc<ParserOptions>,
    functions: FunctionRegistry,
    consts: BTreeMap<String, Value>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::with_options(ParserOptions::default())
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParserOptions) -> Self {
        let consts = [
            ("PI".to_string(), Value::Number(std::f64::consts::PI)),
            ("E".to_string(), Value::Number(std::f64::consts::E)),
        ]
        .into_iter()
        .collect();
        Parser {
            options: Arc::new(options),
            functions: FunctionRegistry::new(),
            consts,
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Register a host function callable from expressions parsed afterwards.
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F) -> FunctionId
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.register(name, func)
    }

    /// Names in the constant table compile straight to literals.
    pub fn define_const(&mut self, name: impl Into<String>, value: Value) {
        self.consts.insert(name.into(), value);
    }

    pub fn remove_const(&mut self, name: &str) -> Option<Value> {
        self.consts.remove(name)
    }

    pub fn consts(&self) -> &BTreeMap<String, Value> {
        &self.consts
    }

    pub fn parse(&self, source: &str) -> Result<Expression> {
        let mut state = ParserState::new(source, &self.options, &self.consts);
        let mut instr = Vec::new();
        state.parse_expression(&mut instr)?;
        let token = state.peek()?;
        if token.kind != TokenKind::Eof {
            return Err(state.unexpected(&token));
        }
        tracing::debug!(instructions = instr.len(), "parsed expression");
        Ok(Expression::new(
            instr,
            Arc::clone(&self.options),
            Arc::new(self.functions.clone()),
            Some(Arc::from(source)),
        ))
    }

    /// Parse and evaluate in one step.
    pub fn evaluate(&self, source: &str, vars: &mut Variables) -> Result<Value> {
        self.parse(source)?.evaluate(vars)
    }
}

// ---- Recursive descent state ----

pub(crate) struct ParserState<'a> {
    tokens: TokenStream<'a>,
    consts: &'a BTreeMap<String, Value>,
    depth: usize,
}

impl<'a> ParserState<'a> {
    pub(crate) fn new(
        source: &'a str,
        options: &'a ParserOptions,
        consts: &'a BTreeMap<String, Value>,
    ) -> Self {
        ParserState { tokens: TokenStream::new(source, options), consts, depth: 0 }
    }

    fn options(&self) -> &'a ParserOptions {
        self.tokens.options()
    }

    fn peek(&mut self) -> Result<Token> {
        self.tokens.peek().cloned()
    }

    fn peek_nth(&mut self, n: usize) -> Result<TokenKind> {
        Ok(self.tokens.peek_nth(n)?.kind.clone())
    }

    fn advance(&mut self) -> Result<Token> {
        self.tokens.advance()
    }

    fn accept(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.tokens.peek()?.kind == *kind {
            self.tokens.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        let token = self.peek()?;
        if token.kind == *kind {
            return self.advance();
        }
        Err(self.error(
            &token,
            format!("expected {}, got {}", kind.describe(), token.kind.describe()),
        ))
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> Error {
        self.tokens.error_at(token.span.start, message)
    }

    fn unexpected(&self, token: &Token) -> Error {
        self.error(token, format!("unexpected {}", token.kind.describe()))
    }

    fn access_error(&self, token: &Token, message: impl Into<String>) -> Error {
        Error::Access {
            message: message.into(),
            position: Some(token.position),
            expression: Some(self.tokens.source().to_string()),
        }
    }

    /// Reject a switched-off operator at `token`.
    fn gate(&self, token: &Token, symbol: &str, context: OpContext) -> Result<()> {
        if self.tokens.is_operator_enabled(symbol, context) {
            return Ok(());
        }
        Err(self.error(token, format!("operator '{symbol}' is not enabled")))
    }

    /// Run `f` one nesting level deeper, failing past the configured ceiling.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.options().max_depth {
            let token = self.peek()?;
            tracing::debug!(depth = self.depth, "parser depth limit reached");
            return Err(self.error(
                &token,
                format!("expression nesting exceeds maximum depth of {}", self.options().max_depth),
            ));
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self));
        self.depth -= 1;
        result
    }

    // ---- Binary operator levels ----

    /// `< <= > >= == !=`
    fn parse_comparison(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_concat(instr)?;
        loop {
            let token = self.peek()?;
            let op = match token.kind {
                TokenKind::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">=")) => op,
                _ => return Ok(()),
            };
            self.gate(&token, op, OpContext::Infix)?;
            self.advance()?;
            self.parse_concat(instr)?;
            instr.push(Instruction::Binary(op.to_string()));
        }
    }

    fn parse_concat(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_additive(instr)?;
        loop {
            let token = self.peek()?;
            if !token.kind.is_op("||") {
                return Ok(());
            }
            self.gate(&token, "||", OpContext::Infix)?;
            self.advance()?;
            self.parse_additive(instr)?;
            instr.push(Instruction::Binary("||".to_string()));
        }
    }

    fn parse_additive(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_term(instr)?;
        loop {
            let token = self.peek()?;
            let op = match token.kind {
                TokenKind::Op(op @ ("+" | "-")) => op,
                _ => return Ok(()),
            };
            self.gate(&token, op, OpContext::Infix)?;
            self.advance()?;
            self.parse_term(instr)?;
            instr.push(Instruction::Binary(op.to_string()));
        }
    }

    fn parse_term(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_factor(instr)?;
        loop {
            let token = self.peek()?;
            let op = match token.kind {
                TokenKind::Op(op @ ("*" | "/" | "%")) => op,
                _ => return Ok(()),
            };
            self.gate(&token, op, OpContext::Infix)?;
            self.advance()?;
            self.parse_factor(instr)?;
            instr.push(Instruction::Binary(op.to_string()));
        }
    }

    // ---- Prefix, power, postfix ----

    fn parse_factor(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.nested(|p| p.parse_factor_inner(instr))
    }

    fn parse_factor_inner(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        let token = self.peek()?;
        let op = match &token.kind {
            TokenKind::Op(op @ ("-" | "+")) => {
                self.gate(&token, op, OpContext::Prefix)?;
                op.to_string()
            }
            TokenKind::Name(name) if self.options().is_prefix_op(name) => {
                // `sin(x)` binds like a call, a bare `sin` is a value
                if self.is_call_or_value_position()? {
                    return self.parse_exponential(instr);
                }
                name.clone()
            }
            _ => return self.parse_exponential(instr),
        };
        self.advance()?;
        self.parse_factor(instr)?;
        instr.push(Instruction::Unary(op));
        Ok(())
    }

    /// For a prefix operator name at the cursor: is the next token `(` or a
    /// token that ends an operand?
    fn is_call_or_value_position(&mut self) -> Result<bool> {
        Ok(matches!(
            self.peek_nth(1)?,
            TokenKind::Paren(_)
                | TokenKind::Bracket(']')
                | TokenKind::Brace('}')
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::Eof
                | TokenKind::Op(":")
        ))
    }

    /// `^` is right-associative and takes a full factor on its right.
    fn parse_exponential(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_postfix(instr)?;
        loop {
            let token = self.peek()?;
            if !token.kind.is_op("^") {
                return Ok(());
            }
            self.gate(&token, "^", OpContext::Infix)?;
            self.advance()?;
            self.parse_factor(instr)?;
            instr.push(Instruction::Binary("^".to_string()));
        }
    }

    fn parse_postfix(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_operand(instr)?;
        loop {
            let token = self.peek()?;
            if !token.kind.is_op("!") {
                return Ok(());
            }
            self.gate(&token, "!", OpContext::Postfix)?;
            self.advance()?;
            instr.push(Instruction::Unary("!".to_string()));
        }
    }

    /// An atom followed by any chain of `.name`, `[index]` and `(args)`.
    fn parse_operand(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        let token = self.peek()?;
        let mut prefix_call = None;
        if let TokenKind::Name(name) = &token.kind {
            if self.options().is_prefix_op(name) && self.peek_nth(1)? == TokenKind::Paren('(') {
                prefix_call = Some(name.clone());
            }
        }
        match prefix_call {
            Some(name) => {
                self.advance()?;
                self.parse_atom(instr)?;
                instr.push(Instruction::Unary(name));
            }
            None => self.parse_atom(instr)?,
        }
        loop {
            let token = self.peek()?;
            match &token.kind {
                TokenKind::Op(".") => {
                    if !self.options().allow_member_access {
                        return Err(self.access_error(&token, "member access is not permitted"));
                    }
                    self.advance()?;
                    let name_token = self.advance()?;
                    let name = match name_token.kind {
                        TokenKind::Name(name) => name,
                        TokenKind::Keyword(k) => k.to_string(),
                        _ => return Err(self.unexpected(&name_token)),
                    };
                    instr.push(Instruction::Member(name));
                }
                TokenKind::Bracket('[') => {
                    if !self.options().allow_member_access {
                        return Err(self.access_error(&token, "member access is not permitted"));
                    }
                    self.advance()?;
                    self.parse_assignment(instr)?;
                    self.expect(&TokenKind::Bracket(']'))?;
                    instr.push(Instruction::Binary("[".to_string()));
                }
                TokenKind::Paren('(') => {
                    self.advance()?;
                    let argc = self.parse_list(instr, &TokenKind::Paren(')'))?;
                    instr.push(Instruction::Call(argc));
                }
                _ => return Ok(()),
            }
        }
    }

    /// Comma separated expressions up to `close`. Returns how many were parsed.
    fn parse_list(&mut self, instr: &mut Vec<Instruction>, close: &TokenKind) -> Result<usize> {
        if self.accept(close)? {
            return Ok(0);
        }
        let mut count = 0;
        loop {
            self.parse_assignment(instr)?;
            count += 1;
            if !self.accept(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(close)?;
        Ok(count)
    }

    // ---- Atoms ----

    fn parse_atom(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        let token = self.advance()?;
        match &token.kind {
            TokenKind::Name(name) => {
                if self.options().conditional_enabled() {
                    match name.as_str() {
                        "case" => return self.parse_case(instr),
                        "when" | "then" | "else" | "end" => {
                            return Err(self.error(&token, format!("'{name}' outside of a case block")));
                        }
                        _ => {}
                    }
                }
                match self.consts.get(name) {
                    Some(value) => instr.push(Instruction::Literal(value.clone())),
                    None => instr.push(Instruction::Var(name.clone())),
                }
            }
            TokenKind::Number(n) => instr.push(Instruction::number(*n)),
            TokenKind::Str(s) => instr.push(Instruction::Literal(Value::String(s.clone()))),
            TokenKind::Keyword("true") => instr.push(Instruction::Literal(Value::Bool(true))),
            TokenKind::Keyword("false") => instr.push(Instruction::Literal(Value::Bool(false))),
            TokenKind::Keyword(_) => instr.push(Instruction::Undefined),
            TokenKind::Paren('(') => {
                self.parse_expression(instr)?;
                self.expect(&TokenKind::Paren(')'))?;
            }
            TokenKind::Bracket('[') => {
                if !self.options().array_enabled() {
                    return Err(self.error(&token, "array literals are not enabled"));
                }
                let len = self.parse_list(instr, &TokenKind::Bracket(']'))?;
                instr.push(Instruction::Array(len));
            }
            TokenKind::Brace('{') => self.parse_object(instr)?,
            _ => return Err(self.unexpected(&token)),
        }
        Ok(())
    }

    /// `{ key: value, "quoted key": value }` after the opening brace.
    fn parse_object(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        instr.push(Instruction::ObjectStart);
        let close = TokenKind::Brace('}');
        while !self.accept(&close)? {
            let key_token = self.advance()?;
            let key = match &key_token.kind {
                TokenKind::Name(name) => name.clone(),
                TokenKind::Str(s) => s.clone(),
                TokenKind::Keyword(k) => k.to_string(),
                TokenKind::Number(n) => format_number(*n),
                _ => return Err(self.error(&key_token, format!("expected object key, got {}", key_token.kind.describe()))),
            };
            if ops::is_unsafe_property(&key) {
                return Err(self.access_error(&key_token, format!("prototype access detected: '{key}'")));
            }
            self.expect(&TokenKind::Op(":"))?;
            instr.push(Instruction::Property(key));
            self.parse_assignment(instr)?;
            if !self.accept(&TokenKind::Comma)? {
                self.expect(&close)?;
                break;
            }
        }
        instr.push(Instruction::ObjectEnd);
        Ok(())
    }
}

/// Parse with default options.
pub fn parse(source: &str) -> Result<Expression> {
    Parser::new().parse(source)
}
