// crates/propgate-grammar/src/expr.rs
// ============================================================================
// Module: Expression Grammar
// Description: Lexer and recursive-descent compiler for rule expressions.
// Purpose: Decide whether an expression snippet compiles, and expose the
//          compiled syntax tree for callers that need it.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Configuration fields may carry small expressions (filters, conditions,
//! computed values). This module compiles them into an [`Expr`] tree without
//! evaluating anything. Compilation is bounded by [`ExprLimits`].
//!
//! ### Grammar (informal)
//! - **Literals**: `42`, `1.5e3`, `"text"`, `'text'`, `` `raw` ``, `true`,
//!   `false`, `nil`
//! - **Access**: `name`, `a.b`, `a["b"]`, `a[0]`, `len(items)`
//! - **Unary**: `!a`, `not a`, `-a`, `+a`
//! - **Binary** (loosest first): `||`/`or`, `&&`/`and`, comparisons
//!   (`==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `not in`, `matches`,
//!   `contains`, `startsWith`, `endsWith`), `+ -`, `* / %`, `**`/`^`
//! - **Conditional**: `cond ? a : b`
//! - **Collections**: `[1, 2]`, `{key: 1, "other key": 2}`
//!
//! Format placeholders (`%s`, `%d`, `%v`, `%q`) are template slots filled in
//! later by the caller; [`is_valid_expression`] substitutes a literal for
//! them before compiling.
//!
//! ```
//! use propgate_grammar::expr::is_valid_expression;
//!
//! assert!(is_valid_expression("request.size > %d && user.role in ['admin', 'ops']"));
//! assert!(!is_valid_expression("a &&"));
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default maximum expression size in bytes.
pub const DEFAULT_MAX_EXPRESSION_BYTES: usize = 64 * 1024;
/// Default maximum nesting depth.
pub const DEFAULT_MAX_EXPRESSION_NESTING: usize = 32;
/// Template placeholders replaced before a validity check.
const PLACEHOLDERS: &[&str] = &["%s", "%d", "%v", "%q"];
/// Literal substituted for each placeholder.
const PLACEHOLDER_SUBSTITUTE: &str = "0";

/// Bounds applied while compiling an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprLimits {
    /// Maximum input size in bytes.
    pub max_bytes: usize,
    /// Maximum nesting depth of grouped, call, and unary expressions.
    pub max_nesting: usize,
}

impl Default for ExprLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_EXPRESSION_BYTES,
            max_nesting: DEFAULT_MAX_EXPRESSION_NESTING,
        }
    }
}

// ============================================================================
// SECTION: Syntax Tree
// ============================================================================

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `nil`.
    Nil,
    /// `true` or `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal with escapes decoded.
    String(String),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!` / `not`.
    Not,
    /// `-`.
    Negate,
    /// `+`.
    Plus,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||` / `or`.
    Or,
    /// `&&` / `and`.
    And,
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// `<`.
    Less,
    /// `<=`.
    LessOrEqual,
    /// `>`.
    Greater,
    /// `>=`.
    GreaterOrEqual,
    /// `in`.
    In,
    /// `not in`.
    NotIn,
    /// `matches`.
    Matches,
    /// `contains`.
    Contains,
    /// `startsWith`.
    StartsWith,
    /// `endsWith`.
    EndsWith,
    /// `+`.
    Add,
    /// `-`.
    Subtract,
    /// `*`.
    Multiply,
    /// `/`.
    Divide,
    /// `%`.
    Modulo,
    /// `**` / `^`.
    Power,
}

/// Compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Literal),
    /// Variable reference.
    Identifier(String),
    /// `object.property`.
    Member {
        /// Accessed expression.
        object: Box<Expr>,
        /// Property name.
        property: String,
    },
    /// `object[index]`.
    Index {
        /// Indexed expression.
        object: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// `callee(arguments...)`.
    Call {
        /// Called identifier or member.
        callee: Box<Expr>,
        /// Call arguments.
        arguments: Vec<Expr>,
    },
    /// Prefix operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Infix operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `condition ? then_branch : else_branch`.
    Conditional {
        /// Condition.
        condition: Box<Expr>,
        /// Value when true.
        then_branch: Box<Expr>,
        /// Value when false.
        else_branch: Box<Expr>,
    },
    /// Array literal.
    Array(Vec<Expr>),
    /// Map literal with string keys.
    Map(Vec<(String, Expr)>),
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while compiling an expression.
///
/// # Invariants
/// - Positions are byte offsets into the compiled input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Input was empty or whitespace only.
    EmptyInput,
    /// Input exceeded the size limit.
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the nesting limit.
    NestingTooDeep {
        /// Maximum allowed depth.
        max_depth: usize,
        /// Depth reached.
        actual_depth: usize,
        /// Byte offset.
        position: usize,
    },
    /// Unexpected token or character.
    UnexpectedToken {
        /// What the parser wanted.
        expected: &'static str,
        /// What it found.
        found: String,
        /// Byte offset.
        position: usize,
    },
    /// String literal without a closing quote.
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// Numeric literal that does not fit or parse.
    InvalidNumber {
        /// Raw literal text.
        raw: String,
        /// Byte offset.
        position: usize,
    },
    /// Call applied to something other than a name or member.
    NotCallable {
        /// Byte offset of the opening parenthesis.
        position: usize,
    },
    /// Input continued after a complete expression.
    TrailingInput {
        /// Byte offset where trailing input begins.
        position: usize,
    },
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "expression is empty"),
            Self::InputTooLarge {
                max_bytes,
                actual_bytes,
            } => write!(f, "expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})"),
            Self::NestingTooDeep {
                max_depth,
                actual_depth,
                position,
            } => write!(
                f,
                "expression nesting exceeds limit: depth {actual_depth} (max {max_depth}) at \
                 {position}"
            ),
            Self::UnexpectedToken {
                expected,
                found,
                position,
            } => write!(f, "unexpected token `{found}` at {position}, expected {expected}"),
            Self::UnterminatedString {
                position,
            } => write!(f, "unterminated string starting at {position}"),
            Self::InvalidNumber {
                raw,
                position,
            } => write!(f, "invalid number `{raw}` at {position}"),
            Self::NotCallable {
                position,
            } => write!(f, "expression is not callable at {position}"),
            Self::TrailingInput {
                position,
            } => write!(f, "unexpected trailing input at {position}"),
        }
    }
}

impl std::error::Error for ExprError {}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Compiles an expression with default limits.
///
/// # Errors
///
/// Returns [`ExprError`] when the expression does not compile.
pub fn compile(input: &str) -> Result<Expr, ExprError> {
    compile_with_limits(input, ExprLimits::default())
}

/// Compiles an expression under the given limits.
///
/// # Errors
///
/// Returns [`ExprError`] for lexical or syntax errors and limit violations.
pub fn compile_with_limits(input: &str, limits: ExprLimits) -> Result<Expr, ExprError> {
    if input.len() > limits.max_bytes {
        return Err(ExprError::InputTooLarge {
            max_bytes: limits.max_bytes,
            actual_bytes: input.len(),
        });
    }
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser::new(tokens, limits.max_nesting);
    let node = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(node.expr)
}

/// Returns true when the expression template compiles after placeholder
/// substitution, using default limits.
#[must_use]
pub fn is_valid_expression(input: &str) -> bool {
    is_valid_expression_with_limits(input, ExprLimits::default())
}

/// Returns true when the expression template compiles after placeholder
/// substitution.
#[must_use]
pub fn is_valid_expression_with_limits(input: &str, limits: ExprLimits) -> bool {
    compile_with_limits(&substitute_placeholders(input), limits).is_ok()
}

/// Replaces template placeholders with a literal.
fn substitute_placeholders(input: &str) -> Cow<'_, str> {
    if !PLACEHOLDERS.iter().any(|placeholder| input.contains(placeholder)) {
        return Cow::Borrowed(input);
    }
    let mut output = input.to_string();
    for placeholder in PLACEHOLDERS {
        output = output.replace(placeholder, PLACEHOLDER_SUBSTITUTE);
    }
    Cow::Owned(output)
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token.
#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    /// Identifier.
    Ident(&'a str),
    /// Numeric literal text.
    Number(&'a str),
    /// Decoded string literal.
    Str(String),
    /// `true`.
    True,
    /// `false`.
    False,
    /// `nil`.
    Nil,
    /// `(`.
    LParen,
    /// `)`.
    RParen,
    /// `[`.
    LBracket,
    /// `]`.
    RBracket,
    /// `{`.
    LBrace,
    /// `}`.
    RBrace,
    /// `,`.
    Comma,
    /// `.`.
    Dot,
    /// `?`.
    Question,
    /// `:`.
    Colon,
    /// `+`.
    Plus,
    /// `-`.
    Minus,
    /// `*`.
    Star,
    /// `/`.
    Slash,
    /// `%`.
    Percent,
    /// `**` or `^`.
    Power,
    /// `!` or `not`.
    Not,
    /// `&&` or `and`.
    And,
    /// `||` or `or`.
    Or,
    /// `==`.
    EqEq,
    /// `!=`.
    NotEq,
    /// `<`.
    Lt,
    /// `<=`.
    Lte,
    /// `>`.
    Gt,
    /// `>=`.
    Gte,
    /// `in`.
    In,
    /// `matches`.
    Matches,
    /// `contains`.
    Contains,
    /// `startsWith`.
    StartsWith,
    /// `endsWith`.
    EndsWith,
    /// End of input.
    Eof,
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
struct SpannedToken<'a> {
    /// Token value.
    token: Token<'a>,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer over expression source.
struct Lexer<'a> {
    /// Source text.
    input: &'a str,
    /// Current byte offset.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Tokenizes the whole input.
    fn lex(&mut self) -> Result<Vec<SpannedToken<'a>>, ExprError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while let Some(&ch) = bytes.get(self.offset) {
            let start = self.offset;
            let token = match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                }
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b'[' => self.single(Token::LBracket),
                b']' => self.single(Token::RBracket),
                b'{' => self.single(Token::LBrace),
                b'}' => self.single(Token::RBrace),
                b',' => self.single(Token::Comma),
                b'.' => self.single(Token::Dot),
                b'?' => self.single(Token::Question),
                b':' => self.single(Token::Colon),
                b'+' => self.single(Token::Plus),
                b'-' => self.single(Token::Minus),
                b'/' => self.single(Token::Slash),
                b'%' => self.single(Token::Percent),
                b'^' => self.single(Token::Power),
                b'*' => self.one_or_two(b'*', Token::Star, Token::Power),
                b'!' => self.one_or_two(b'=', Token::Not, Token::NotEq),
                b'<' => self.one_or_two(b'=', Token::Lt, Token::Lte),
                b'>' => self.one_or_two(b'=', Token::Gt, Token::Gte),
                b'=' => self.pair(b'=', Token::EqEq, "==")?,
                b'&' => self.pair(b'&', Token::And, "&&")?,
                b'|' => self.pair(b'|', Token::Or, "||")?,
                b'"' | b'\'' => self.string(ch)?,
                b'`' => self.raw_string()?,
                b'0' ..= b'9' => self.number()?,
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    self.consume_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                    Self::keyword_or_ident(&self.input[start .. self.offset])
                }
                _ => {
                    let found = self.input[start ..].chars().next().unwrap_or_default();
                    return Err(ExprError::UnexpectedToken {
                        expected: "identifier, literal, or operator",
                        found: found.to_string(),
                        position: start,
                    });
                }
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }

        if tokens.is_empty() {
            return Err(ExprError::EmptyInput);
        }
        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Consumes one byte and returns `token`.
    const fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.offset += 1;
        token
    }

    /// Returns `double` when the next byte is `second`, otherwise `single`.
    fn one_or_two(&mut self, second: u8, single: Token<'a>, double: Token<'a>) -> Token<'a> {
        if self.input.as_bytes().get(self.offset + 1) == Some(&second) {
            self.offset += 2;
            double
        } else {
            self.offset += 1;
            single
        }
    }

    /// Requires a doubled operator such as `&&`.
    fn pair(
        &mut self,
        second: u8,
        token: Token<'a>,
        expected: &'static str,
    ) -> Result<Token<'a>, ExprError> {
        if self.input.as_bytes().get(self.offset + 1) == Some(&second) {
            self.offset += 2;
            Ok(token)
        } else {
            Err(ExprError::UnexpectedToken {
                expected,
                found: char::from(self.input.as_bytes()[self.offset]).to_string(),
                position: self.offset,
            })
        }
    }

    /// Lexes a quoted string with escapes.
    fn string(&mut self, quote: u8) -> Result<Token<'a>, ExprError> {
        let start = self.offset;
        let mut decoded = String::new();
        let mut chars = self.input[start + 1 ..].char_indices();
        while let Some((index, ch)) = chars.next() {
            if ch == char::from(quote) {
                self.offset = start + 1 + index + 1;
                return Ok(Token::Str(decoded));
            }
            if ch != '\\' {
                decoded.push(ch);
                continue;
            }
            let Some((escape_index, escaped)) = chars.next() else {
                break;
            };
            let replacement = match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' | '\'' | '"' => escaped,
                other => {
                    return Err(ExprError::UnexpectedToken {
                        expected: "escape sequence",
                        found: format!("\\{other}"),
                        position: start + 1 + escape_index,
                    });
                }
            };
            decoded.push(replacement);
        }
        Err(ExprError::UnterminatedString {
            position: start,
        })
    }

    /// Lexes a backtick string without escapes.
    fn raw_string(&mut self) -> Result<Token<'a>, ExprError> {
        let start = self.offset;
        let body = &self.input[start + 1 ..];
        let Some(end) = body.find('`') else {
            return Err(ExprError::UnterminatedString {
                position: start,
            });
        };
        self.offset = start + 1 + end + 1;
        Ok(Token::Str(body[.. end].to_string()))
    }

    /// Lexes an integer or decimal literal.
    fn number(&mut self) -> Result<Token<'a>, ExprError> {
        let start = self.offset;
        let bytes = self.input.as_bytes();
        self.consume_while(|b| b.is_ascii_digit());
        if bytes.get(self.offset) == Some(&b'.')
            && bytes.get(self.offset + 1).is_some_and(u8::is_ascii_digit)
        {
            self.offset += 1;
            self.consume_while(|b| b.is_ascii_digit());
        }
        if matches!(bytes.get(self.offset), Some(b'e' | b'E')) {
            self.offset += 1;
            if matches!(bytes.get(self.offset), Some(b'+' | b'-')) {
                self.offset += 1;
            }
            let digits_start = self.offset;
            self.consume_while(|b| b.is_ascii_digit());
            if self.offset == digits_start {
                return Err(ExprError::InvalidNumber {
                    raw: self.input[start .. self.offset].to_string(),
                    position: start,
                });
            }
        }
        Ok(Token::Number(&self.input[start .. self.offset]))
    }

    /// Advances while the predicate matches.
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(&b) = self.input.as_bytes().get(self.offset) {
            if predicate(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }

    /// Maps a word to a keyword token or identifier.
    fn keyword_or_ident(word: &'a str) -> Token<'a> {
        match word {
            "true" => Token::True,
            "false" => Token::False,
            "nil" => Token::Nil,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "matches" => Token::Matches,
            "contains" => Token::Contains,
            "startsWith" => Token::StartsWith,
            "endsWith" => Token::EndsWith,
            _ => Token::Ident(word),
        }
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Expression under construction with its tree height.
struct Node {
    /// Built expression.
    expr: Expr,
    /// Edges on the longest path to a leaf.
    height: usize,
}

impl Node {
    /// Wraps a literal or identifier.
    const fn leaf(expr: Expr) -> Self {
        Self {
            expr,
            height: 0,
        }
    }
}

/// Recursive-descent parser over the token stream.
struct Parser<'a> {
    /// Tokens ending in `Eof`.
    tokens: Vec<SpannedToken<'a>>,
    /// Current token index.
    index: usize,
    /// Current nesting depth.
    nesting: usize,
    /// Maximum nesting depth.
    max_nesting: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser.
    const fn new(tokens: Vec<SpannedToken<'a>>, max_nesting: usize) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
            max_nesting,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> Result<Node, ExprError> {
        self.parse_conditional()
    }

    /// Parses `a ? b : c` (right associative).
    fn parse_conditional(&mut self) -> Result<Node, ExprError> {
        let condition = self.parse_or()?;
        let position = self.current().position;
        if !self.matches(&Token::Question) {
            return Ok(condition);
        }
        self.with_nesting(position, |parser| {
            let then_branch = parser.parse_conditional()?;
            parser.expect(&Token::Colon, "`:` in conditional")?;
            let else_branch = parser.parse_conditional()?;
            let height = condition.height.max(then_branch.height).max(else_branch.height);
            parser.node(
                Expr::Conditional {
                    condition: Box::new(condition.expr),
                    then_branch: Box::new(then_branch.expr),
                    else_branch: Box::new(else_branch.expr),
                },
                height,
                position,
            )
        })
    }

    /// Parses `||` chains.
    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_and()?;
        loop {
            let position = self.current().position;
            if !self.matches(&Token::Or) {
                return Ok(lhs);
            }
            let rhs = self.parse_and()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs, position)?;
        }
    }

    /// Parses `&&` chains.
    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let position = self.current().position;
            if !self.matches(&Token::And) {
                return Ok(lhs);
            }
            let rhs = self.parse_comparison()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs, position)?;
        }
    }

    /// Parses comparison and membership operators.
    fn parse_comparison(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let position = self.current().position;
            let Some(op) = self.comparison_operator() else {
                return Ok(lhs);
            };
            let rhs = self.parse_additive()?;
            lhs = self.binary(op, lhs, rhs, position)?;
        }
    }

    /// Consumes a comparison operator if one is next.
    fn comparison_operator(&mut self) -> Option<BinaryOp> {
        let op = match self.current().token {
            Token::EqEq => BinaryOp::Equal,
            Token::NotEq => BinaryOp::NotEqual,
            Token::Lt => BinaryOp::Less,
            Token::Lte => BinaryOp::LessOrEqual,
            Token::Gt => BinaryOp::Greater,
            Token::Gte => BinaryOp::GreaterOrEqual,
            Token::In => BinaryOp::In,
            Token::Matches => BinaryOp::Matches,
            Token::Contains => BinaryOp::Contains,
            Token::StartsWith => BinaryOp::StartsWith,
            Token::EndsWith => BinaryOp::EndsWith,
            Token::Not if self.peek().is_some_and(|next| next.token == Token::In) => {
                BinaryOp::NotIn
            }
            _ => return None,
        };
        if op == BinaryOp::NotIn {
            self.advance();
        }
        self.advance();
        Some(op)
    }

    /// Parses `+` and `-` chains.
    fn parse_additive(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let position = self.current().position;
            let op = match self.current().token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs, position)?;
        }
    }

    /// Parses `*`, `/` and `%` chains.
    fn parse_multiplicative(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_power()?;
        loop {
            let position = self.current().position;
            let op = match self.current().token {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                Token::Percent => BinaryOp::Modulo,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_power()?;
            lhs = self.binary(op, lhs, rhs, position)?;
        }
    }

    /// Parses right-associative exponentiation.
    fn parse_power(&mut self) -> Result<Node, ExprError> {
        let base = self.parse_unary()?;
        let position = self.current().position;
        if !self.matches(&Token::Power) {
            return Ok(base);
        }
        self.with_nesting(position, |parser| {
            let exponent = parser.parse_power()?;
            parser.binary(BinaryOp::Power, base, exponent, position)
        })
    }

    /// Parses prefix operators.
    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        let op = match self.current().token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        let position = self.current().position;
        self.advance();
        self.with_nesting(position, |parser| {
            let operand = parser.parse_unary()?;
            parser.node(
                Expr::Unary {
                    op,
                    operand: Box::new(operand.expr),
                },
                operand.height,
                position,
            )
        })
    }

    /// Parses member access, indexing, and calls.
    fn parse_postfix(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_primary()?;
        loop {
            let position = self.current().position;
            if self.matches(&Token::Dot) {
                let Token::Ident(property) = self.current().token else {
                    return Err(self.unexpected("property name after `.`"));
                };
                self.advance();
                node = self.node(
                    Expr::Member {
                        object: Box::new(node.expr),
                        property: property.to_string(),
                    },
                    node.height,
                    position,
                )?;
            } else if self.matches(&Token::LBracket) {
                node = self.with_nesting(position, |parser| {
                    let index = parser.parse_expression()?;
                    parser.expect(&Token::RBracket, "`]` after index")?;
                    parser.node(
                        Expr::Index {
                            object: Box::new(node.expr),
                            index: Box::new(index.expr),
                        },
                        node.height.max(index.height),
                        position,
                    )
                })?;
            } else if self.matches(&Token::LParen) {
                if !matches!(node.expr, Expr::Identifier(_) | Expr::Member { .. }) {
                    return Err(ExprError::NotCallable {
                        position,
                    });
                }
                node = self.with_nesting(position, |parser| {
                    let (arguments, height) =
                        parser.parse_sequence(&Token::RParen, "`)` after arguments")?;
                    parser.node(
                        Expr::Call {
                            callee: Box::new(node.expr),
                            arguments,
                        },
                        node.height.max(height),
                        position,
                    )
                })?;
            } else {
                return Ok(node);
            }
        }
    }

    /// Parses a primary expression.
    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let SpannedToken {
            token,
            position,
        } = self.current().clone();
        let literal = match token {
            Token::Number(raw) => parse_number(raw, position)?,
            Token::Str(text) => Literal::String(text),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Nil => Literal::Nil,
            Token::Ident(name) => {
                self.advance();
                return Ok(Node::leaf(Expr::Identifier(name.to_string())));
            }
            Token::LParen => {
                self.advance();
                return self.with_nesting(position, |parser| {
                    let inner = parser.parse_expression()?;
                    parser.expect(&Token::RParen, "`)`")?;
                    Ok(inner)
                });
            }
            Token::LBracket => {
                self.advance();
                return self.with_nesting(position, |parser| {
                    let (items, height) =
                        parser.parse_sequence(&Token::RBracket, "`]` after array")?;
                    parser.node(Expr::Array(items), height, position)
                });
            }
            Token::LBrace => {
                self.advance();
                return self.with_nesting(position, |parser| parser.parse_map_entries(position));
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(Node::leaf(Expr::Literal(literal)))
    }

    /// Parses comma-separated expressions up to `close` (trailing comma
    /// allowed), returning them with the tallest item height.
    fn parse_sequence(
        &mut self,
        close: &Token<'_>,
        expected: &'static str,
    ) -> Result<(Vec<Expr>, usize), ExprError> {
        let mut items = Vec::new();
        let mut height = 0;
        loop {
            if self.matches(close) {
                return Ok((items, height));
            }
            let item = self.parse_expression()?;
            height = height.max(item.height);
            items.push(item.expr);
            if !self.matches(&Token::Comma) {
                self.expect(close, expected)?;
                return Ok((items, height));
            }
        }
    }

    /// Parses `key: value` entries up to `}`.
    fn parse_map_entries(&mut self, position: usize) -> Result<Node, ExprError> {
        let mut entries = Vec::new();
        let mut height = 0;
        loop {
            if self.matches(&Token::RBrace) {
                return self.node(Expr::Map(entries), height, position);
            }
            let key = match self.current().token.clone() {
                Token::Ident(name) => name.to_string(),
                Token::Str(text) => text,
                Token::Number(raw) => raw.to_string(),
                _ => return Err(self.unexpected("map key")),
            };
            self.advance();
            self.expect(&Token::Colon, "`:` after map key")?;
            let value = self.parse_expression()?;
            height = height.max(value.height);
            entries.push((key, value.expr));
            if !self.matches(&Token::Comma) {
                self.expect(&Token::RBrace, "`}` after map")?;
                return self.node(Expr::Map(entries), height, position);
            }
        }
    }

    /// Builds a binary node.
    fn binary(
        &self,
        op: BinaryOp,
        lhs: Node,
        rhs: Node,
        position: usize,
    ) -> Result<Node, ExprError> {
        let height = lhs.height.max(rhs.height);
        self.node(
            Expr::Binary {
                op,
                lhs: Box::new(lhs.expr),
                rhs: Box::new(rhs.expr),
            },
            height,
            position,
        )
    }

    /// Wraps a composite expression one level above its tallest child,
    /// enforcing the nesting limit on tree height.
    fn node(&self, expr: Expr, child_height: usize, position: usize) -> Result<Node, ExprError> {
        let height = child_height + 1;
        if height > self.max_nesting {
            return Err(ExprError::NestingTooDeep {
                max_depth: self.max_nesting,
                actual_depth: height,
                position,
            });
        }
        Ok(Node {
            expr,
            height,
        })
    }

    /// Runs a parser step while enforcing the nesting limit.
    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        let next_depth = self.nesting + 1;
        if next_depth > self.max_nesting {
            return Err(ExprError::NestingTooDeep {
                max_depth: self.max_nesting,
                actual_depth: next_depth,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Consumes the expected token or fails.
    fn expect(&mut self, token: &Token<'_>, expected: &'static str) -> Result<(), ExprError> {
        if self.matches(token) { Ok(()) } else { Err(self.unexpected(expected)) }
    }

    /// Ensures all input was consumed.
    fn expect_eof(&self) -> Result<(), ExprError> {
        if self.current().token == Token::Eof {
            Ok(())
        } else {
            Err(ExprError::TrailingInput {
                position: self.current().position,
            })
        }
    }

    /// Consumes the current token when it has the same kind as `kind`.
    fn matches(&mut self, kind: &Token<'_>) -> bool {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Builds an unexpected-token error at the current token.
    fn unexpected(&self, expected: &'static str) -> ExprError {
        ExprError::UnexpectedToken {
            expected,
            found: describe(&self.current().token),
            position: self.current().position,
        }
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken<'a> {
        debug_assert!(self.index < self.tokens.len(), "parser index out of bounds");
        &self.tokens[self.index]
    }

    /// Returns the token after the current one.
    fn peek(&self) -> Option<&SpannedToken<'a>> {
        self.tokens.get(self.index + 1)
    }

    /// Advances, stopping at `Eof`.
    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts numeric literal text into a literal.
fn parse_number(raw: &str, position: usize) -> Result<Literal, ExprError> {
    let invalid = || ExprError::InvalidNumber {
        raw: raw.to_string(),
        position,
    };
    if raw.contains(['.', 'e', 'E']) {
        raw.parse::<f64>().map(Literal::Float).map_err(|_| invalid())
    } else {
        raw.parse::<i64>().map(Literal::Int).map_err(|_| invalid())
    }
}

/// Renders a token for diagnostics.
fn describe(token: &Token<'_>) -> String {
    let text = match token {
        Token::Ident(text) | Token::Number(text) => return (*text).to_string(),
        Token::Str(text) => return format!("{text:?}"),
        Token::True => "true",
        Token::False => "false",
        Token::Nil => "nil",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Dot => ".",
        Token::Question => "?",
        Token::Colon => ":",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::Power => "**",
        Token::Not => "!",
        Token::And => "&&",
        Token::Or => "||",
        Token::EqEq => "==",
        Token::NotEq => "!=",
        Token::Lt => "<",
        Token::Lte => "<=",
        Token::Gt => ">",
        Token::Gte => ">=",
        Token::In => "in",
        Token::Matches => "matches",
        Token::Contains => "contains",
        Token::StartsWith => "startsWith",
        Token::EndsWith => "endsWith",
        Token::Eof => "end of input",
    };
    text.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
