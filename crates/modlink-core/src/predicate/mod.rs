//! Visibility predicates that can cross a process boundary.
//!
//! A module decides whether one of its configuration fields is visible based
//! on the values of the other fields.  The host UI that renders the fields
//! lives in another process and cannot call back into the module for every
//! keystroke, so the decision has to travel as data.
//!
//! A [`Predicate`] is that data: a small, side-effect-free expression
//! language whose text form looks like the arrow function an author would
//! write by hand:
//!
//! ```text
//! (options) => options.mode === "advanced" && options.port > 1024
//! ```
//!
//! The sending side carries the text in `isVisibleFn`; the receiving side
//! parses it with [`Predicate::parse`] and evaluates it with
//! [`Predicate::evaluate`] against the current option values.  The evaluator
//! can read the options map and nothing else: there are no globals, calls,
//! assignments or loops in the grammar:
//!
//! ```text
//! predicate  := "(" ident ")" "=>" expr  |  ident "=>" expr
//! expr       := expr ("||" | "&&") expr
//!             | expr ("==" | "!=" | "===" | "!==" | "<" | "<=" | ">" | ">=") expr
//!             | "!" expr | "-" expr | "(" expr ")"
//!             | number | string | "true" | "false" | "null"
//!             | ident ( "." ident | "[" string "]" | "[" number "]" )*
//! ```
//!
//! The only identifier allowed in a path is the parameter itself.

mod eval;
pub mod expr;
mod lexer;
mod parser;

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

pub use expr::{BinaryOp, Expr, PathSegment};

use crate::value::is_truthy;

/// Longest accepted predicate source, in bytes.
pub const MAX_SOURCE_LEN: usize = 4096;

/// Deepest accepted nesting of parentheses and unary operators.
pub const MAX_DEPTH: usize = 64;

/// Errors produced while parsing predicate text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PredicateError {
    /// The text is not valid predicate syntax.
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// The expression refers to something other than its parameter.
    #[error("unknown identifier `{name}`")]
    UnknownIdentifier { name: String },

    /// The text exceeds [`MAX_SOURCE_LEN`].
    #[error("predicate source is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    /// The expression nests deeper than [`MAX_DEPTH`].
    #[error("predicate nests deeper than {max} levels")]
    TooDeep { max: usize },

    /// A built predicate names its parameter with something that is not an
    /// identifier.
    #[error("`{name}` is not a valid parameter name")]
    InvalidParameter { name: String },

    /// A built predicate holds an array or object literal, which has no
    /// text form.
    #[error("literal {literal} cannot be written as predicate text")]
    UnsupportedLiteral { literal: String },
}

/// A parsed visibility predicate together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    param: String,
    source: String,
    body: Expr,
}

impl Predicate {
    /// Builds a predicate from an expression tree.
    ///
    /// The source text is the canonical rendering:
    ///
    /// ```rust
    /// use modlink_core::{Expr, Predicate};
    ///
    /// let p = Predicate::new("options", Expr::option("enabled")).unwrap();
    /// assert_eq!(p.source(), "(options) => options.enabled");
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when the rendered text would not parse on the receiving side:
    /// [`PredicateError::InvalidParameter`] for a non-identifier `param`,
    /// [`PredicateError::UnsupportedLiteral`] for an array or object literal,
    /// and [`PredicateError::TooLong`] / [`PredicateError::TooDeep`] when the
    /// tree exceeds the parser's limits.
    pub fn new(param: impl Into<String>, body: Expr) -> Result<Self, PredicateError> {
        let param = param.into();
        if !expr::is_identifier(&param) {
            return Err(PredicateError::InvalidParameter { name: param });
        }
        if let Some(literal) = body.compound_literal() {
            return Err(PredicateError::UnsupportedLiteral {
                literal: literal.to_string(),
            });
        }

        let source = format!("({param}) => {}", body.render(&param));
        // Same checks the receiving side runs, so size and depth limits hold.
        Self::parse(&source)?;
        Ok(Self {
            param,
            source,
            body,
        })
    }

    /// Parses predicate text, keeping the text verbatim as the source.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError`] if the text is too long, nests too deeply,
    /// refers to an identifier other than its parameter, or is not valid
    /// syntax.
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(PredicateError::TooLong {
                len: source.len(),
                max: MAX_SOURCE_LEN,
            });
        }
        let tokens = lexer::tokenize(source)?;
        let (param, body) = parser::Parser::new(&tokens, source.len()).parse_predicate()?;
        Ok(Self {
            param,
            source: source.to_string(),
            body,
        })
    }

    /// The text form carried on the wire.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parameter name paths are rooted at.
    pub fn param(&self) -> &str {
        &self.param
    }

    /// The expression body.
    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Evaluates the predicate against the current option values.
    pub fn evaluate(&self, options: &Map<String, Value>) -> bool {
        is_truthy(&eval::evaluate(&self.body, options))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
