//! Predicate expression tree, its builder helpers and canonical rendering.

use std::fmt::{self, Write as _};

use serde_json::Value;

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub(crate) const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// One step of a path below the predicate parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A predicate expression.
///
/// Built either by parsing source text or with the helpers below:
///
/// ```rust
/// use modlink_core::predicate::Expr;
///
/// let expr = Expr::option("mode").strict_eq("advanced").and(Expr::option("port").gt(0));
/// assert_eq!(
///     expr.render("options"),
///     r#"options.mode === "advanced" && options.port > 0"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<PathSegment>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// `param.<key>` — the current value of one option.
    pub fn option(key: impl Into<String>) -> Self {
        Expr::Path(vec![PathSegment::Key(key.into())])
    }

    /// A literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Appends `.key` to a path expression; other expressions are returned
    /// unchanged.
    pub fn key(self, key: impl Into<String>) -> Self {
        match self {
            Expr::Path(mut segments) => {
                segments.push(PathSegment::Key(key.into()));
                Expr::Path(segments)
            }
            other => other,
        }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn strict_eq(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::StrictEq, rhs)
    }

    pub fn strict_ne(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::StrictNotEq, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// The first array or object literal in the tree, if any.
    ///
    /// Such literals have no text form in the grammar.
    pub(crate) fn compound_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(value @ (Value::Array(_) | Value::Object(_))) => Some(value),
            Expr::Literal(_) | Expr::Path(_) => None,
            Expr::Not(inner) | Expr::Neg(inner) => inner.compound_literal(),
            Expr::Binary { lhs, rhs, .. } => lhs.compound_literal().or_else(|| rhs.compound_literal()),
        }
    }

    /// Renders the expression in canonical form, with paths rooted at `param`.
    pub fn render(&self, param: &str) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_expr(&mut out, self, param, 0);
        out
    }
}

/// Logical negation: `!expr`.
impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Not(Box::new(self))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Literal(Value::from(value))
    }
}

/// Writes `expr`, parenthesizing it when its precedence is below `parent`.
fn write_expr(out: &mut String, expr: &Expr, param: &str, parent: u8) -> fmt::Result {
    match expr {
        Expr::Literal(value) => write!(out, "{value}"),
        Expr::Path(segments) => {
            out.push_str(param);
            for segment in segments {
                match segment {
                    PathSegment::Key(key) if is_identifier(key) => write!(out, ".{key}")?,
                    PathSegment::Key(key) => write!(out, "[{}]", Value::from(key.as_str()))?,
                    PathSegment::Index(index) => write!(out, "[{index}]")?,
                }
            }
            Ok(())
        }
        Expr::Not(inner) => {
            out.push('!');
            write_expr(out, inner, param, u8::MAX)
        }
        Expr::Neg(inner) => {
            out.push('-');
            write_expr(out, inner, param, u8::MAX)
        }
        Expr::Binary { op, lhs, rhs } => {
            let precedence = op.precedence();
            let wrap = precedence < parent;
            if wrap {
                out.push('(');
            }
            write_expr(out, lhs, param, precedence)?;
            write!(out, " {} ", op.symbol())?;
            // Operators are left-associative: an equal-precedence right child
            // needs parentheses to keep its grouping.
            write_expr(out, rhs, param, precedence + 1)?;
            if wrap {
                out.push(')');
            }
            Ok(())
        }
    }
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !matches!(text, "true" | "false" | "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_parenthesizes_lower_precedence_child() {
        let expr = Expr::option("a").or(Expr::option("b")).and(Expr::option("c"));
        assert_eq!(expr.render("o"), "(o.a || o.b) && o.c");
    }

    #[test]
    fn test_render_keeps_right_grouping() {
        let expr = Expr::option("a").and(Expr::option("b").and(Expr::option("c")));
        assert_eq!(expr.render("o"), "o.a && (o.b && o.c)");
    }

    #[test]
    fn test_render_quotes_non_identifier_keys() {
        let expr = Expr::option("has space").key("inner");
        assert_eq!(expr.render("o"), r#"o["has space"].inner"#);
    }

    #[test]
    fn test_compound_literal_is_found_anywhere_in_the_tree() {
        let nested = !Expr::option("a").and(Expr::option("b").strict_eq(json!({"k": 1})));

        assert_eq!(nested.compound_literal(), Some(&json!({"k": 1})));
        assert_eq!(Expr::option("a").strict_eq("x").compound_literal(), None);
    }

    #[test]
    fn test_render_literals_as_json() {
        let expr = !Expr::option("s").strict_eq(json!("say \"hi\""));
        assert_eq!(expr.render("o"), r#"!(o.s === "say \"hi\"")"#);
    }
}
