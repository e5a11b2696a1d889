//! Lexer and recursive-descent parser for x8 expressions.
//!
//! Supports condition (`where`) expressions, update (`set`) expressions,
//! projections (`select`), and orderings (`order_by`). Keywords are matched
//! case-insensitively. `@name` parameters are substituted as values while
//! parsing and are never re-read as syntax.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::{Map, Number, Value};

use crate::ast::{
    BUILTIN_NAMESPACE, ComparisonOp, Expression, Function, OrderBy, OrderByDirection,
    OrderByTerm, Select, SelectTerm, Update, UpdateOp, UpdateOperation,
};
use crate::error::ExpressionError;

/// Parameter bindings for `@name` placeholders.
pub type Params = Map<String, Value>;

// ---------------------------------------------------------------------------
// Token type
// ---------------------------------------------------------------------------

/// Lexer token for x8 expressions.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// A plain identifier (field name, function name, contextual keyword).
    Identifier(String),
    /// A parameter reference (`@name`).
    Parameter(String),
    /// A quoted string literal.
    Str(String),
    /// An integer literal.
    Int(i64),
    /// A floating-point literal.
    Float(f64),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    // Keywords
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `between`
    Between,
    /// `in`
    In,
    /// `like`
    Like,
    /// End of input.
    Eof,
}

impl Token {
    /// Keyword tokens double as plain names after a `.` in a path.
    fn keyword_text(&self) -> Option<&'static str> {
        match self {
            Self::And => Some("and"),
            Self::Or => Some("or"),
            Self::Not => Some("not"),
            Self::Between => Some("between"),
            Self::In => Some("in"),
            Self::Like => Some("like"),
            Self::True => Some("true"),
            Self::False => Some("false"),
            Self::Null => Some("null"),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::Parameter(s) => write!(f, "@{s}"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::Eq => write!(f, "'='"),
            Self::Ne => write!(f, "'!='"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::Comma => write!(f, "','"),
            Self::Dot => write!(f, "'.'"),
            Self::Colon => write!(f, "':'"),
            Self::Minus => write!(f, "'-'"),
            Self::Star => write!(f, "'*'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
            Self::Between => write!(f, "BETWEEN"),
            Self::In => write!(f, "IN"),
            Self::Like => write!(f, "LIKE"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    position: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Tokenizer for x8 expression strings.
struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the entire input into a vector of tokens ending in `Eof`.
    fn tokenize(&mut self) -> Result<Vec<Spanned>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// The character after the next one.
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn next_token(&mut self) -> Result<Spanned, ExpressionError> {
        self.skip_whitespace();

        let position = self.position();
        let Some(ch) = self.peek_char() else {
            return Ok(Spanned {
                token: Token::Eof,
                position,
            });
        };

        let token = match ch {
            '\'' | '"' => self.read_string(ch, position)?,
            '@' => self.read_parameter(position)?,
            '=' => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                }
                Token::Eq
            }
            '!' => {
                self.bump();
                if self.peek_char() != Some('=') {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "'=' after '!'".to_owned(),
                        found: self
                            .peek_char()
                            .map_or_else(|| "EOF".to_owned(), |c| format!("'{c}'")),
                        position: position + 1,
                    });
                }
                self.bump();
                Token::Ne
            }
            '<' => self.read_lt_family(),
            '>' => self.read_gt_family(),
            '-' => {
                if self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                    self.read_number(true, position)?
                } else {
                    self.single(Token::Minus)
                }
            }
            ',' => self.single(Token::Comma),
            '.' => self.single(Token::Dot),
            ':' => self.single(Token::Colon),
            '*' => self.single(Token::Star),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            c if c.is_ascii_digit() => self.read_number(false, position)?,
            c if is_ident_start(c) => self.read_identifier_or_keyword(),
            _ => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "valid token".to_owned(),
                    found: format!("'{ch}'"),
                    position,
                });
            }
        };

        Ok(Spanned { token, position })
    }

    fn read_lt_family(&mut self) -> Token {
        self.bump(); // consume '<'
        match self.peek_char() {
            Some('=') => self.single(Token::Le),
            Some('>') => self.single(Token::Ne),
            _ => Token::Lt,
        }
    }

    fn read_gt_family(&mut self) -> Token {
        self.bump(); // consume '>'
        if self.peek_char() == Some('=') {
            self.single(Token::Ge)
        } else {
            Token::Gt
        }
    }

    fn read_digits(&mut self, s: &mut String) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, negative: bool, position: usize) -> Result<Token, ExpressionError> {
        let mut s = String::new();
        if negative {
            s.push('-');
        }
        self.read_digits(&mut s);

        let mut is_float = false;
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.bump();
            self.read_digits(&mut s);
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let next = self.peek_second();
            if next.is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-') {
                is_float = true;
                s.push('e');
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    s.push(sign);
                    self.bump();
                }
                self.read_digits(&mut s);
            }
        }

        let invalid = |message: String| ExpressionError::InvalidLiteral { message, position };
        if is_float {
            let f: f64 = s
                .parse()
                .map_err(|_| invalid(format!("'{s}' is not a valid number")))?;
            if !f.is_finite() {
                return Err(invalid(format!("'{s}' is out of range")));
            }
            Ok(Token::Float(f))
        } else {
            s.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| invalid(format!("'{s}' is out of range for an integer")))
        }
    }

    fn read_string(&mut self, quote: char, position: usize) -> Result<Token, ExpressionError> {
        self.bump(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(c) => s.push(c),
                    None => break,
                },
                Some(c) => s.push(c),
                None => break,
            }
        }
        Err(ExpressionError::InvalidLiteral {
            message: "unterminated string".to_owned(),
            position,
        })
    }

    fn read_parameter(&mut self, position: usize) -> Result<Token, ExpressionError> {
        self.bump(); // consume '@'
        let name = self.read_ident_chars();
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedToken {
                expected: "parameter name after '@'".to_owned(),
                found: "empty".to_owned(),
                position,
            });
        }
        Ok(Token::Parameter(name))
    }

    fn read_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            if is_ident_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let mut ident = String::new();
        if let Some(c) = self.bump() {
            ident.push(c);
        }
        ident.push_str(&self.read_ident_chars());
        match ident.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "between" => Token::Between,
            "in" => Token::In,
            "like" => Token::Like,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(ident),
        }
    }
}

/// Returns `true` if `c` can start an identifier. `$` marks reserved fields.
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

/// Returns `true` if `c` can continue an identifier.
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive-descent parser for x8 expressions.
struct Parser<'p> {
    tokens: Vec<Spanned>,
    pos: usize,
    params: Option<&'p Params>,
}

impl<'p> Parser<'p> {
    fn new(tokens: Vec<Spanned>, params: Option<&'p Params>) -> Self {
        Self {
            tokens,
            pos: 0,
            params,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.position)
    }

    fn advance(&mut self) -> Token {
        let tok = self
            .tokens
            .get(self.pos)
            .map_or(Token::Eof, |s| s.token.clone());
        self.pos += 1;
        tok
    }

    /// Error describing the current token.
    fn unexpected(&self, expected: &str) -> ExpressionError {
        match self.peek() {
            Token::Eof => ExpressionError::UnexpectedEof {
                position: self.position(),
            },
            tok => ExpressionError::UnexpectedToken {
                expected: expected.to_owned(),
                found: tok.to_string(),
                position: self.position(),
            },
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Token, ExpressionError> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn expect_end(&self) -> Result<(), ExpressionError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn resolve_param(&self, name: &str) -> Result<Value, ExpressionError> {
        self.params
            .and_then(|p| p.get(name).or_else(|| p.get(&format!("@{name}"))))
            .cloned()
            .ok_or_else(|| ExpressionError::UnresolvedParameter {
                name: name.to_owned(),
            })
    }

    /// Whether the current identifier matches `word`, ignoring case.
    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Identifier(s) if s.eq_ignore_ascii_case(word))
    }
}

// ---------------------------------------------------------------------------
// Condition expression parsing (precedence climbing)
// ---------------------------------------------------------------------------

impl Parser<'_> {
    /// Parse a full condition expression (OR is lowest precedence).
    fn parse_or_expr(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_and_expr()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expression::or(left, right);
        }
        Ok(left)
    }

    /// Parse AND expressions.
    fn parse_and_expr(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_not_expr()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_not_expr()?;
            left = Expression::and(left, right);
        }
        Ok(left)
    }

    /// Parse NOT expressions.
    fn parse_not_expr(&mut self) -> Result<Expression, ExpressionError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            let expr = self.parse_not_expr()?;
            return Ok(Expression::negate(expr));
        }
        self.parse_primary_expr()
    }

    /// Parse comparisons, bare operands, and parenthesized groups.
    fn parse_primary_expr(&mut self) -> Result<Expression, ExpressionError> {
        if matches!(self.peek(), Token::LParen) {
            self.advance();
            let expr = self.parse_or_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        let operand = self.parse_operand()?;
        self.parse_postfix_expr(operand)
    }

    /// After a left operand, parse a comparison, BETWEEN, IN, NOT IN, or LIKE.
    fn parse_postfix_expr(&mut self, left: Expression) -> Result<Expression, ExpressionError> {
        let op = match self.peek() {
            Token::Eq => ComparisonOp::Eq,
            Token::Ne => ComparisonOp::Ne,
            Token::Lt => ComparisonOp::Lt,
            Token::Le => ComparisonOp::Lte,
            Token::Gt => ComparisonOp::Gt,
            Token::Ge => ComparisonOp::Gte,
            Token::Like => ComparisonOp::Like,
            Token::Between => {
                self.advance();
                let low = self.parse_literal()?;
                self.expect(&Token::And)?;
                let high = self.parse_literal()?;
                return Ok(Expression::compare(
                    left,
                    ComparisonOp::Between,
                    Expression::Value(Value::Array(vec![low, high])),
                ));
            }
            Token::In => {
                self.advance();
                let list = self.parse_in_list()?;
                return Ok(Expression::compare(left, ComparisonOp::In, list));
            }
            Token::Not if matches!(self.peek_at(1), Token::In) => {
                self.advance();
                self.advance();
                let list = self.parse_in_list()?;
                return Ok(Expression::compare(left, ComparisonOp::Nin, list));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Expression::compare(left, op, right))
    }

    /// `(v1, v2, ...)`, an array literal, or a parameter bound to an array.
    fn parse_in_list(&mut self) -> Result<Expression, ExpressionError> {
        if !matches!(self.peek(), Token::LParen) {
            return Ok(Expression::Value(self.parse_literal()?));
        }
        self.advance();
        let mut items = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            items.push(self.parse_literal()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                items.push(self.parse_literal()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expression::Value(Value::Array(items)))
    }
}

// ---------------------------------------------------------------------------
// Operand & path parsing
// ---------------------------------------------------------------------------

impl Parser<'_> {
    /// Parse an operand: function call, field path, literal, or parameter.
    fn parse_operand(&mut self) -> Result<Expression, ExpressionError> {
        match self.peek() {
            Token::Identifier(_) => {
                if matches!(self.peek_at(1), Token::LParen) {
                    return self.parse_function(BUILTIN_NAMESPACE.to_owned());
                }
                if matches!(self.peek_at(1), Token::Dot)
                    && matches!(self.peek_at(2), Token::Identifier(_))
                    && matches!(self.peek_at(3), Token::LParen)
                {
                    let Token::Identifier(namespace) = self.advance() else {
                        return Err(self.unexpected("namespace"));
                    };
                    self.advance(); // consume '.'
                    return self.parse_function(namespace.to_ascii_lowercase());
                }
                Ok(Expression::field(self.parse_path(false)?))
            }
            _ => Ok(Expression::Value(self.parse_literal()?)),
        }
    }

    /// Parse `name(arg, ..., key=value, ...)`; the name token is current.
    fn parse_function(&mut self, namespace: String) -> Result<Expression, ExpressionError> {
        let Token::Identifier(name) = self.advance() else {
            return Err(self.unexpected("function name"));
        };
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        let mut named_args = BTreeMap::new();
        if !matches!(self.peek(), Token::RParen) {
            loop {
                if matches!(self.peek(), Token::Identifier(_))
                    && matches!(self.peek_at(1), Token::Eq)
                {
                    let Token::Identifier(key) = self.advance() else {
                        return Err(self.unexpected("argument name"));
                    };
                    self.advance(); // consume '='
                    named_args.insert(key, self.parse_operand()?);
                } else {
                    args.push(self.parse_operand()?);
                }
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expression::Function(Function {
            namespace,
            name: name.to_ascii_lowercase(),
            args,
            named_args,
        }))
    }

    /// Parse a field path such as `a.b[0].c` and return its canonical text.
    ///
    /// The append marker `[-]` is accepted only when `allow_append` is set.
    fn parse_path(&mut self, allow_append: bool) -> Result<String, ExpressionError> {
        let Token::Identifier(first) = self.peek().clone() else {
            return Err(self.unexpected("field path"));
        };
        self.advance();
        let mut path = first;

        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let segment = match self.peek() {
                        Token::Identifier(s) => s.clone(),
                        Token::Int(n) if *n >= 0 => n.to_string(),
                        tok => match tok.keyword_text() {
                            Some(word) => word.to_owned(),
                            None => return Err(self.unexpected("field name after '.'")),
                        },
                    };
                    self.advance();
                    path.push('.');
                    path.push_str(&segment);
                }
                Token::LBracket => {
                    let position = self.position();
                    self.advance();
                    match self.peek() {
                        Token::Int(n) if *n >= 0 => {
                            let n = *n;
                            self.advance();
                            path.push_str(&format!("[{n}]"));
                        }
                        Token::Minus => {
                            if !allow_append {
                                return Err(ExpressionError::InvalidPath {
                                    path: format!("{path}[-]"),
                                    message: format!(
                                        "append marker at position {position} is only valid in updates"
                                    ),
                                });
                            }
                            self.advance();
                            path.push_str("[-]");
                        }
                        _ => return Err(self.unexpected("array index or '-'")),
                    }
                    self.expect(&Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(path)
    }

    /// Parse a literal value or a parameter reference.
    fn parse_literal(&mut self) -> Result<Value, ExpressionError> {
        let position = self.position();
        match self.peek().clone() {
            Token::Str(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Value::Number(Number::from(n)))
            }
            Token::Float(f) => {
                self.advance();
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ExpressionError::InvalidLiteral {
                        message: format!("{f} is not a finite number"),
                        position,
                    })
            }
            Token::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Value::Null)
            }
            Token::Parameter(name) => {
                self.advance();
                self.resolve_param(&name)
            }
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_object_literal(),
            _ => Err(self.unexpected("literal value")),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Value, ExpressionError> {
        self.expect(&Token::LBracket)?;
        let mut items = Vec::new();
        if !matches!(self.peek(), Token::RBracket) {
            items.push(self.parse_literal()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                items.push(self.parse_literal()?);
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Value::Array(items))
    }

    fn parse_object_literal(&mut self) -> Result<Value, ExpressionError> {
        self.expect(&Token::LBrace)?;
        let mut map = Map::new();
        if !matches!(self.peek(), Token::RBrace) {
            loop {
                let key = match self.peek().clone() {
                    Token::Str(s) | Token::Identifier(s) => s,
                    _ => return Err(self.unexpected("object key")),
                };
                self.advance();
                self.expect(&Token::Colon)?;
                map.insert(key, self.parse_literal()?);
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Value::Object(map))
    }
}

// ---------------------------------------------------------------------------
// Update expression parsing
// ---------------------------------------------------------------------------

impl Parser<'_> {
    /// Parse `[set] field=op(args), ...`.
    fn parse_update_expr(&mut self) -> Result<Update, ExpressionError> {
        if self.peek_word("set") && matches!(self.peek_at(1), Token::Identifier(_)) {
            self.advance();
        }

        let mut update = Update::new();
        loop {
            update.operations.push(self.parse_update_operation()?);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(update)
    }

    fn parse_update_operation(&mut self) -> Result<UpdateOperation, ExpressionError> {
        let field = self.parse_path(true)?;
        self.expect(&Token::Eq)?;

        let position = self.position();
        let op = match self.peek() {
            Token::Identifier(name) => UpdateOp::from_name(name),
            _ => None,
        }
        .ok_or_else(|| self.unexpected("update operation"))?;
        self.advance();

        if field.ends_with("[-]") && op != UpdateOp::Insert {
            return Err(ExpressionError::InvalidPath {
                path: field,
                message: format!("append marker at position {position} requires insert"),
            });
        }

        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            loop {
                args.push(self.parse_update_arg(op)?);
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;

        Ok(UpdateOperation {
            field,
            op,
            args: normalize_update_args(op, args)?,
        })
    }

    /// `move` takes a bare source path; every other op takes literals.
    fn parse_update_arg(&mut self, op: UpdateOp) -> Result<Value, ExpressionError> {
        if op == UpdateOp::Move && matches!(self.peek(), Token::Identifier(_)) {
            return Ok(Value::String(self.parse_path(false)?));
        }
        self.parse_literal()
    }
}

fn normalize_update_args(op: UpdateOp, args: Vec<Value>) -> Result<Vec<Value>, ExpressionError> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExpressionError::invalid_operand(
                op.as_str(),
                format!("expected {expected} argument(s), found {}", args.len()),
            ))
        }
    };

    match op {
        UpdateOp::Delete => arity(0)?,
        UpdateOp::Put | UpdateOp::Insert | UpdateOp::Increment | UpdateOp::Move => arity(1)?,
        UpdateOp::ArrayUnion | UpdateOp::ArrayRemove => {
            if args.is_empty() {
                return Err(ExpressionError::invalid_operand(
                    op.as_str(),
                    "expected a list of values",
                ));
            }
            if !(args.len() == 1 && args[0].is_array()) {
                return Ok(vec![Value::Array(args)]);
            }
        }
    }
    Ok(args)
}

// ---------------------------------------------------------------------------
// Projection & ordering parsing
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_select_expr(&mut self) -> Result<Select, ExpressionError> {
        if self.at_end() {
            return Ok(Select::new());
        }
        if matches!(self.peek(), Token::Star) {
            self.advance();
            return Ok(Select::new());
        }

        let mut terms = Vec::new();
        loop {
            let field = self.parse_path(false)?;
            let alias = if self.peek_word("as") {
                self.advance();
                Some(self.parse_path(false)?)
            } else {
                None
            };
            terms.push(SelectTerm { field, alias });
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(Select { terms })
    }

    fn parse_order_by_expr(&mut self) -> Result<OrderBy, ExpressionError> {
        let mut terms = Vec::new();
        if self.at_end() {
            return Ok(OrderBy { terms });
        }
        loop {
            let field = self.parse_path(false)?;
            let direction = if self.peek_word("desc") {
                self.advance();
                OrderByDirection::Desc
            } else {
                if self.peek_word("asc") {
                    self.advance();
                }
                OrderByDirection::Asc
            };
            terms.push(OrderByTerm { field, direction });
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(OrderBy { terms })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a condition (`where`) expression.
///
/// # Errors
///
/// Returns `ExpressionError` if the expression is syntactically invalid or
/// references an unbound parameter.
pub fn parse_condition(input: &str, params: Option<&Params>) -> Result<Expression, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens, params);
    let expr = parser.parse_or_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse an update (`set`) expression.
///
/// # Errors
///
/// Returns `ExpressionError` if the expression is syntactically invalid.
pub fn parse_update(input: &str, params: Option<&Params>) -> Result<Update, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens, params);
    let update = parser.parse_update_expr()?;
    parser.expect_end()?;
    Ok(update)
}

/// Parse a projection. `*` and the empty string select whole documents.
///
/// # Errors
///
/// Returns `ExpressionError` if the projection is syntactically invalid.
pub fn parse_select(input: &str) -> Result<Select, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens, None);
    let select = parser.parse_select_expr()?;
    parser.expect_end()?;
    Ok(select)
}

/// Parse an ordering such as `pk, int DESC`.
///
/// # Errors
///
/// Returns `ExpressionError` if the ordering is syntactically invalid.
pub fn parse_order_by(input: &str) -> Result<OrderBy, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens, None);
    let order_by = parser.parse_order_by_expr()?;
    parser.expect_end()?;
    Ok(order_by)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
