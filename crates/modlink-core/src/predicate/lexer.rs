//! Tokenizer for predicate source text.

use crate::predicate::PredicateError;

/// One lexical token together with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Arrow,
    Bang,
    Minus,
    OrOr,
    AndAnd,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    Number(f64),
    Str(String),
    Ident(String),
}

/// Splits `source` into tokens.
///
/// # Errors
///
/// Returns [`PredicateError::Syntax`] on an unexpected character, an
/// unterminated string or a malformed escape or number.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        // Two- and three-character operators first.
        let rest = &source[offset..];
        let operator = [
            ("===", Token::EqEqEq),
            ("!==", Token::NotEqEq),
            ("=>", Token::Arrow),
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::Le),
            (">=", Token::Ge),
            ("&&", Token::AndAnd),
            ("||", Token::OrOr),
        ]
        .into_iter()
        .find(|(text, _)| rest.starts_with(text));
        if let Some((text, token)) = operator {
            for _ in 0..text.len() {
                chars.next();
            }
            tokens.push(Spanned { token, offset });
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '.' => Some(Token::Dot),
            '!' => Some(Token::Bang),
            '-' => Some(Token::Minus),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned { token, offset });
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let text = lex_string(&mut chars, c, offset)?;
            tokens.push(Spanned {
                token: Token::Str(text),
                offset,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                let exponent_sign = (d == '+' || d == '-')
                    && matches!(source[..i].chars().last(), Some('e' | 'E'));
                if d.is_ascii_alphanumeric() || d == '.' || exponent_sign {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &source[offset..end];
            let value: f64 = text.parse().map_err(|_| PredicateError::Syntax {
                offset,
                message: format!("invalid number literal `{text}`"),
            })?;
            tokens.push(Spanned {
                token: Token::Number(value),
                offset,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' || d == '$' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Spanned {
                token: Token::Ident(source[offset..end].to_string()),
                offset,
            });
            continue;
        }

        return Err(PredicateError::Syntax {
            offset,
            message: format!("unexpected character `{c}`"),
        });
    }

    Ok(tokens)
}

/// Reads a quoted string body after the opening quote has been consumed.
fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, PredicateError> {
    let mut text = String::new();
    loop {
        let Some((offset, c)) = chars.next() else {
            return Err(PredicateError::Syntax {
                offset: start,
                message: "unterminated string literal".to_string(),
            });
        };
        if c == quote {
            return Ok(text);
        }
        if c != '\\' {
            text.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some((_, '"')) => '"',
            Some((_, '\'')) => '\'',
            Some((_, '\\')) => '\\',
            Some((_, '/')) => '/',
            Some((_, 'b')) => '\u{0008}',
            Some((_, 'f')) => '\u{000C}',
            Some((_, 'n')) => '\n',
            Some((_, 'r')) => '\r',
            Some((_, 't')) => '\t',
            Some((_, 'u')) => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = chars
                        .next()
                        .and_then(|(_, h)| h.to_digit(16))
                        .ok_or_else(|| PredicateError::Syntax {
                            offset,
                            message: "invalid \\u escape".to_string(),
                        })?;
                    code = code * 16 + digit;
                }
                char::from_u32(code).ok_or_else(|| PredicateError::Syntax {
                    offset,
                    message: format!("\\u{code:04x} is not a scalar value"),
                })?
            }
            _ => {
                return Err(PredicateError::Syntax {
                    offset,
                    message: "invalid escape sequence".to_string(),
                })
            }
        };
        text.push(escaped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_arrow_and_comparison() {
        assert_eq!(
            kinds("(cfg)=>cfg.x>0"),
            vec![
                Token::LParen,
                Token::Ident("cfg".to_string()),
                Token::RParen,
                Token::Arrow,
                Token::Ident("cfg".to_string()),
                Token::Dot,
                Token::Ident("x".to_string()),
                Token::Gt,
                Token::Number(0.0),
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            kinds("a === b !== c == d != e"),
            vec![
                Token::Ident("a".to_string()),
                Token::EqEqEq,
                Token::Ident("b".to_string()),
                Token::NotEqEq,
                Token::Ident("c".to_string()),
                Token::EqEq,
                Token::Ident("d".to_string()),
                Token::NotEq,
                Token::Ident("e".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "tab\there" "A""#),
            vec![
                Token::Str("it's".to_string()),
                Token::Str("tab\there".to_string()),
                Token::Str("A".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers_with_fraction_and_exponent() {
        assert_eq!(kinds("1.5 2e3 4E-1"), vec![
            Token::Number(1.5),
            Token::Number(2000.0),
            Token::Number(0.4),
        ]);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("'abc").unwrap_err();
        assert!(matches!(err, PredicateError::Syntax { offset: 0, .. }));
    }

    #[test]
    fn test_assignment_is_rejected() {
        // A lone `=` is not part of the grammar.
        let err = tokenize("a = 1").unwrap_err();
        assert!(matches!(err, PredicateError::Syntax { offset: 2, .. }));
    }

    #[test]
    fn test_call_syntax_characters_are_rejected() {
        assert!(tokenize("x; y").is_err());
        assert!(tokenize("{}").is_err());
        assert!(tokenize("a + b").is_err());
    }
}
