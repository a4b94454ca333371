//! JSON Pointer (RFC 6901) parsing and resolution.

use serde_json::Value;

use crate::patch::PatchError;

/// Splits a pointer into unescaped reference tokens.
///
/// `""` addresses the whole document and yields no tokens.
pub(crate) fn parse(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer {
            pointer: pointer.to_string(),
        });
    };
    rest.split('/')
        .map(|raw| unescape(raw, pointer))
        .collect()
}

fn unescape(raw: &str, pointer: &str) -> Result<String, PatchError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(PatchError::InvalidPointer {
                    pointer: pointer.to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Escapes one key for use as a pointer token.
pub(crate) fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Parses an array index token: decimal digits without leading zeros.
pub(crate) fn array_index(token: &str) -> Option<usize> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if well_formed {
        token.parse().ok()
    } else {
        None
    }
}

pub(crate) fn resolve<'a>(mut current: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(array_index(token)?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn resolve_mut<'a>(mut current: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token)?,
            Value::Array(items) => items.get_mut(array_index(token)?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_pointer_has_no_tokens() {
        assert_eq!(parse("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_escapes_are_decoded() {
        assert_eq!(parse("/a~1b/c~0d/").unwrap(), vec!["a/b", "c~d", ""]);
    }

    #[test]
    fn test_pointer_must_start_with_slash() {
        assert!(matches!(parse("a/b"), Err(PatchError::InvalidPointer { .. })));
        assert!(matches!(parse("/bad~2"), Err(PatchError::InvalidPointer { .. })));
    }

    #[test]
    fn test_escape_is_inverse_of_parse() {
        let key = "odd/~key";
        assert_eq!(parse(&format!("/{}", escape(key))).unwrap(), vec![key]);
    }

    #[test]
    fn test_array_index_rejects_leading_zero() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-"), None);
        assert_eq!(array_index("1a"), None);
    }

    #[test]
    fn test_resolve_through_objects_and_arrays() {
        let doc = json!({"surfaces": [{"id": "a"}, {"id": "b"}]});
        let tokens = parse("/surfaces/1/id").unwrap();

        assert_eq!(resolve(&doc, &tokens), Some(&json!("b")));
        assert_eq!(resolve(&doc, &parse("/surfaces/2").unwrap()), None);
    }
}
