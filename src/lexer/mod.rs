use logos::Logos;

use crate::error::{Error, Position, Result};
use crate::parser::ParserOptions;

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

// ---- Raw tokens ----

/// Reasons the raw lexer rejects a slice of input.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    UnknownCharacter,
    InvalidNumber(String),
    InvalidString(String),
    UnterminatedString,
    InvalidName(String),
}

// Alias keeps the logos derive from rewriting `'static` to the source lifetime.
type StaticStr = &'static str;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
// an unterminated comment swallows the rest of the input
#[logos(skip r"/\*([^*]|\*+[^*/])*\**")]
enum RawToken {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    #[token("true", |_| "true")]
    #[token("false", |_| "false")]
    #[token("undefined", |_| "undefined")]
    Keyword(StaticStr),

    #[token("+", |_| "+")]
    #[token("-", |_| "-")]
    #[token("*", |_| "*")]
    #[token("\u{2219}", |_| "*")]
    #[token("\u{2022}", |_| "*")]
    #[token("/", |_| "/")]
    #[token("%", |_| "%")]
    #[token("^", |_| "^")]
    #[token("?", |_| "?")]
    #[token(":", |_| ":")]
    #[token(".", |_| ".")]
    #[token("!", |_| "!")]
    #[token("=", |_| "=")]
    #[token("==", |_| "==")]
    #[token("!=", |_| "!=")]
    #[token("<", |_| "<")]
    #[token("<=", |_| "<=")]
    #[token(">", |_| ">")]
    #[token(">=", |_| ">=")]
    #[token("|", |_| "||")]
    #[token("||", |_| "||")]
    Op(StaticStr),

    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?", decimal)]
    #[regex(r"0[xX][0-9A-Fa-f]+", |lex| radix(lex, 16))]
    #[regex(r"0[bB][01]+", |lex| radix(lex, 2))]
    #[regex(r"([0-9]+\.[0-9]*|\.[0-9]+)\.[0-9.]*", malformed_number)]
    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)[eE][+-]?", malformed_number)]
    #[regex(r"0[xX]([0-9A-Fa-f]*[.g-zG-Z_][0-9A-Za-z_.]*)?", malformed_number)]
    #[regex(r"0[bB]([01]*[.2-9A-Za-z_][0-9A-Za-z_.]*)?", malformed_number)]
    Number(f64),

    #[regex(r#""([^"\\]|\\(.|\n))*("|\\)?"#, string_literal)]
    #[regex(r#"'([^'\\]|\\(.|\n))*('|\\)?"#, string_literal)]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    #[regex(r"\$[A-Za-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    #[regex(r"\$([0-9_][A-Za-z0-9_]*)?", invalid_name)]
    Name(String),
}

fn decimal(lex: &mut logos::Lexer<RawToken>) -> std::result::Result<f64, LexErrorKind> {
    lex.slice()
        .parse::<f64>()
        .map_err(|_| LexErrorKind::InvalidNumber(lex.slice().to_string()))
}

fn radix(lex: &mut logos::Lexer<RawToken>, radix: u32) -> std::result::Result<f64, LexErrorKind> {
    let digits = &lex.slice()[2..];
    u64::from_str_radix(digits, radix)
        .map(|n| n as f64)
        .map_err(|_| LexErrorKind::InvalidNumber(lex.slice().to_string()))
}

fn malformed_number(lex: &mut logos::Lexer<RawToken>) -> std::result::Result<f64, LexErrorKind> {
    Err(LexErrorKind::InvalidNumber(lex.slice().to_string()))
}

fn invalid_name(lex: &mut logos::Lexer<RawToken>) -> std::result::Result<String, LexErrorKind> {
    Err(LexErrorKind::InvalidName(lex.slice().to_string()))
}

fn string_literal(lex: &mut logos::Lexer<RawToken>) -> std::result::Result<String, LexErrorKind> {
    let slice = lex.slice();
    let mut chars = slice.chars();
    let quote = chars.next().ok_or(LexErrorKind::UnterminatedString)?;
    let mut out = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let high = unicode_escape(&mut chars)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    // a high surrogate must be followed by an escaped low surrogate
                    let mut rest = chars.clone();
                    let low = match (rest.next(), rest.next()) {
                        (Some('\\'), Some('u')) => unicode_escape(&mut rest)?,
                        _ => return Err(invalid_unicode(high)),
                    };
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(invalid_unicode(high));
                    }
                    chars = rest;
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                out.push(char::from_u32(code).ok_or_else(|| invalid_unicode(code))?);
            }
            Some(other) => {
                return Err(LexErrorKind::InvalidString(format!(
                    "invalid escape sequence '\\{other}'"
                )));
            }
            None => return Err(LexErrorKind::UnterminatedString),
        }
    }
    Err(LexErrorKind::UnterminatedString)
}

fn unicode_escape(chars: &mut std::str::Chars<'_>) -> std::result::Result<u32, LexErrorKind> {
    let digits: String = chars.by_ref().take(4).collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LexErrorKind::InvalidString(format!(
            "invalid unicode escape '\\u{digits}'"
        )));
    }
    u32::from_str_radix(&digits, 16)
        .map_err(|_| LexErrorKind::InvalidString(format!("invalid unicode escape '\\u{digits}'")))
}

fn invalid_unicode(code: u32) -> LexErrorKind {
    LexErrorKind::InvalidString(format!("invalid unicode escape '\\u{code:04X}'"))
}

// ---- Public tokens ----

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Op(&'static str),
    Number(f64),
    Str(String),
    /// `(` or `)`
    Paren(char),
    /// `[` or `]`
    Bracket(char),
    /// `{` or `}`
    Brace(char),
    Comma,
    Semicolon,
    Name(String),
    Keyword(&'static str),
}

impl From<RawToken> for TokenKind {
    fn from(raw: RawToken) -> Self {
        match raw {
            RawToken::LParen => TokenKind::Paren('('),
            RawToken::RParen => TokenKind::Paren(')'),
            RawToken::LBracket => TokenKind::Bracket('['),
            RawToken::RBracket => TokenKind::Bracket(']'),
            RawToken::LBrace => TokenKind::Brace('{'),
            RawToken::RBrace => TokenKind::Brace('}'),
            RawToken::Comma => TokenKind::Comma,
            RawToken::Semicolon => TokenKind::Semicolon,
            RawToken::Keyword(k) => TokenKind::Keyword(k),
            RawToken::Op(op) => TokenKind::Op(op),
            RawToken::Number(n) => TokenKind::Number(n),
            RawToken::Str(s) => TokenKind::Str(s),
            RawToken::Name(n) => TokenKind::Name(n),
        }
    }
}

impl TokenKind {
    /// Short description used in "unexpected token" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Op(op) => format!("'{op}'"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string {s:?}"),
            TokenKind::Paren(c) | TokenKind::Bracket(c) | TokenKind::Brace(c) => format!("'{c}'"),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Name(n) => format!("name '{n}'"),
            TokenKind::Keyword(k) => format!("'{k}'"),
        }
    }

    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, TokenKind::Op(o) if *o == op)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, TokenKind::Name(n) if n == name)
    }
}

/// A token with its byte span and 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub position: Position,
}

// ---- Token stream ----

/// On-demand token stream over one expression's source text.
///
/// Tokens are lexed lazily into a buffer so the parser can peek ahead and
/// rewind with `save`/`restore`. Operator gating is answered here from the
/// parser's options; lexing itself never depends on configuration.
pub struct TokenStream<'src> {
    source: &'src str,
    options: &'src ParserOptions,
    lexer: logos::Lexer<'src, RawToken>,
    source_map: SourceMap,
    buffer: Vec<Token>,
    pos: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(source: &'src str, options: &'src ParserOptions) -> Self {
        TokenStream {
            source,
            options,
            lexer: RawToken::lexer(source),
            source_map: SourceMap::new(source),
            buffer: Vec::new(),
            pos: 0,
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    pub fn options(&self) -> &'src ParserOptions {
        self.options
    }

    /// Whether the operator spelled `symbol` in `context` is switched on.
    pub fn is_operator_enabled(&self, symbol: &str, context: OpContext) -> bool {
        self.options.is_operator_enabled(symbol, context)
    }

    pub fn peek(&mut self) -> Result<&Token> {
        self.peek_nth(0)
    }

    /// Look `n` tokens past the current one. Past the end this keeps returning `Eof`.
    pub fn peek_nth(&mut self, n: usize) -> Result<&Token> {
        let idx = self.pos + n;
        self.fill(idx)?;
        let last = self.buffer.len().saturating_sub(1);
        self.buffer
            .get(idx.min(last))
            .ok_or_else(|| self.error_at(self.source.len(), "unexpected end of input"))
    }

    pub fn advance(&mut self) -> Result<Token> {
        let token = self.peek()?.clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        Ok(token)
    }

    pub fn save(&self) -> usize {
        self.pos
    }

    pub fn restore(&mut self, mark: usize) {
        self.pos = mark;
    }

    pub fn position(&self, offset: usize) -> Position {
        self.source_map.position(self.source, offset)
    }

    /// Build a positioned parse error against this stream's source.
    pub fn error_at(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            message: message.into(),
            position: self.position(offset),
            expression: self.source.to_string(),
        }
    }

    fn fill(&mut self, idx: usize) -> Result<()> {
        while self.buffer.len() <= idx {
            if matches!(self.buffer.last(), Some(t) if t.kind == TokenKind::Eof) {
                return Ok(());
            }
            let token = self.lex_next()?;
            self.buffer.push(token);
        }
        Ok(())
    }

    fn lex_next(&mut self) -> Result<Token> {
        match self.lexer.next() {
            None => {
                let end = self.source.len();
                Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span { start: end, end },
                    position: self.position(end),
                })
            }
            Some(Ok(raw)) => {
                let range = self.lexer.span();
                Ok(Token {
                    kind: raw.into(),
                    span: Span { start: range.start, end: range.end },
                    position: self.position(range.start),
                })
            }
            Some(Err(kind)) => {
                let range = self.lexer.span();
                let message = match kind {
                    LexErrorKind::UnknownCharacter => {
                        format!("unknown character '{}'", &self.source[range.clone()])
                    }
                    LexErrorKind::InvalidNumber(text) => format!("invalid number literal '{text}'"),
                    LexErrorKind::InvalidString(message) => message,
                    LexErrorKind::UnterminatedString => "unterminated string literal".to_string(),
                    LexErrorKind::InvalidName(text) => {
                        format!("invalid name '{text}': '$' must be followed by a letter")
                    }
                };
                Err(Error::Lex {
                    message,
                    position: self.position(range.start),
                    expression: self.source.to_string(),
                })
            }
        }
    }
}

/// Grammar position an operator symbol appears in; `-` and `+` gate differently as prefix ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpContext {
    Prefix,
    Infix,
    Postfix,
}

/// Lex the whole of `source` with default options.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let options = ParserOptions::default();
    let mut stream = TokenStream::new(source, &options);
    let mut tokens = Vec::new();
    loop {
        let token = stream.advance()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
