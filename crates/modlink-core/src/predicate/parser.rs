//! Recursive-descent parser producing an [`Expr`] from tokens.
//!
//! ```text
//! predicate  := "(" ident ")" "=>" expr  |  ident "=>" expr
//! expr       := or
//! or         := and ( "||" and )*
//! and        := equality ( "&&" equality )*
//! equality   := compare ( ("==" | "!=" | "===" | "!==") compare )*
//! compare    := unary ( ("<" | "<=" | ">" | ">=") unary )*
//! unary      := "!" unary | "-" unary | primary
//! primary    := number | string | "true" | "false" | "null" | path | "(" expr ")"
//! path       := ident ( "." ident | "[" string "]" | "[" number "]" )*
//! ```

use serde_json::{Number, Value};

use crate::predicate::expr::{BinaryOp, Expr, PathSegment};
use crate::predicate::lexer::{Spanned, Token};
use crate::predicate::{PredicateError, MAX_DEPTH};

pub(crate) struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    source_len: usize,
    param: String,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Spanned], source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source_len,
            param: String::new(),
            depth: 0,
        }
    }

    /// Parses a whole predicate, returning the parameter name and the body.
    pub(crate) fn parse_predicate(mut self) -> Result<(String, Expr), PredicateError> {
        let param = match self.next_token() {
            Some(Token::LParen) => {
                let name = self.expect_ident("parameter name")?;
                self.expect(&Token::RParen, "`)` after parameter")?;
                name
            }
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error_at_previous("expected `(param) =>`")),
        };
        self.expect(&Token::Arrow, "`=>`")?;
        self.param = param;

        let body = self.parse_expr()?;
        if self.pos < self.tokens.len() {
            return Err(self.error_here("unexpected trailing input"));
        }
        Ok((std::mem::take(&mut self.param), body))
    }

    fn parse_expr(&mut self) -> Result<Expr, PredicateError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PredicateError::TooDeep { max: MAX_DEPTH });
        }
        let expr = self.parse_binary(1);
        self.depth -= 1;
        expr
    }

    /// Precedence climbing over the left-associative binary operators.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, PredicateError> {
        if min_precedence > 4 {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(min_precedence + 1)?;

        while let Some(op) = self.peek_binary_op() {
            if op.precedence() != min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(min_precedence + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_nested_unary()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_nested_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_nested_unary(&mut self) -> Result<Expr, PredicateError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PredicateError::TooDeep { max: MAX_DEPTH });
        }
        let expr = self.parse_unary();
        self.depth -= 1;
        expr
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        match self.next_token() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if name == self.param => self.parse_path_tail(),
                _ => Err(PredicateError::UnknownIdentifier { name }),
            },
            Some(_) => Err(self.error_at_previous("expected a value")),
            None => Err(self.error_here("unexpected end of input")),
        }
    }

    fn parse_path_tail(&mut self) -> Result<Expr, PredicateError> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let key = self.expect_ident("property name")?;
                    segments.push(PathSegment::Key(key));
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let segment = match self.next_token() {
                        Some(Token::Str(key)) => PathSegment::Key(key),
                        Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                            PathSegment::Index(n as usize)
                        }
                        _ => return Err(self.error_at_previous("expected string or index")),
                    };
                    self.expect(&Token::RBracket, "`]`")?;
                    segments.push(segment);
                }
                _ => return Ok(Expr::Path(segments)),
            }
        }
    }

    // ── Token helpers ─────────────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek()? {
            Token::OrOr => BinaryOp::Or,
            Token::AndAnd => BinaryOp::And,
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::NotEq,
            Token::EqEqEq => BinaryOp::StrictEq,
            Token::NotEqEq => BinaryOp::StrictNotEq,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return None,
        })
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), PredicateError> {
        match self.next_token() {
            Some(ref token) if token == expected => Ok(()),
            Some(_) => Err(self.error_at_previous(&format!("expected {what}"))),
            None => Err(self.error_here(&format!("expected {what}"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, PredicateError> {
        match self.next_token() {
            Some(Token::Ident(name)) => Ok(name),
            Some(_) => Err(self.error_at_previous(&format!("expected {what}"))),
            None => Err(self.error_here(&format!("expected {what}"))),
        }
    }

    fn offset_of(&self, pos: usize) -> usize {
        self.tokens
            .get(pos)
            .map_or(self.source_len, |s| s.offset)
    }

    fn error_here(&self, message: &str) -> PredicateError {
        PredicateError::Syntax {
            offset: self.offset_of(self.pos),
            message: message.to_string(),
        }
    }

    fn error_at_previous(&self, message: &str) -> PredicateError {
        PredicateError::Syntax {
            offset: self.offset_of(self.pos.saturating_sub(1)),
            message: message.to_string(),
        }
    }
}

/// Integral literals become JSON integers so they render without a fraction.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}
