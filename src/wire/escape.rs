//! Separator escaping for delimited wire tokens.
//!
//! Parts are joined with `:`; a backslash escapes both itself and the
//! separator. Two placeholder forms exist at the part level: the lone token
//! `\0` encodes an absent (null) part, and the lone string `\` encodes an
//! empty part list, so that every `Vec<Option<String>>` round-trips
//! unambiguously.

/// Separator between parts of a joined token.
const SEPARATOR: char = ':';

/// Escape character; escapes itself and the separator.
const ESCAPE: char = '\\';

/// Whole-part placeholder for an absent (null) part.
const NULL_PLACEHOLDER: &str = "\\0";

/// Placeholder for a joined empty part list.
const EMPTY_LIST_PLACEHOLDER: &str = "\\";

fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

fn unescape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(next) if next == ESCAPE || next == SEPARATOR => out.push(next),
                // Unknown escape sequence: keep both characters verbatim.
                Some(next) => {
                    out.push(ESCAPE);
                    out.push(next);
                }
                None => out.push(ESCAPE),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Join parts into one token, escaping separators. `None` parts are encoded
/// as the null placeholder.
pub fn escape_and_join<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = String::new();
    let mut any = false;
    for part in parts {
        if any {
            out.push(SEPARATOR);
        }
        any = true;
        match part {
            Some(part) => out.push_str(&escape_part(part)),
            None => out.push_str(NULL_PLACEHOLDER),
        }
    }
    if !any {
        return EMPTY_LIST_PLACEHOLDER.to_string();
    }
    out
}

/// Split a joined token back into its parts, undoing the escaping.
///
/// The inverse of [`escape_and_join`] for every input that function can
/// produce; arbitrary other inputs are parsed leniently (a dangling escape
/// character is kept verbatim).
pub fn split_and_unescape(joined: &str) -> Vec<Option<String>> {
    if joined == EMPTY_LIST_PLACEHOLDER {
        return Vec::new();
    }

    // Split on separators preceded by an even number of escape characters.
    let mut raw_parts = Vec::new();
    let mut part = String::new();
    let mut escape_run = 0usize;
    for c in joined.chars() {
        if c == ESCAPE {
            escape_run += 1;
            part.push(c);
        } else if c == SEPARATOR {
            if escape_run % 2 == 0 {
                raw_parts.push(std::mem::take(&mut part));
            } else {
                part.push(c);
            }
            escape_run = 0;
        } else {
            part.push(c);
            escape_run = 0;
        }
    }
    raw_parts.push(part);

    raw_parts
        .into_iter()
        .map(|raw| {
            if raw == NULL_PLACEHOLDER {
                None
            } else {
                Some(unescape_part(&raw))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(parts: Vec<Option<&str>>) -> Vec<Option<String>> {
        split_and_unescape(&escape_and_join(parts))
    }

    #[test]
    fn test_plain_parts() {
        assert_eq!(escape_and_join([Some("a"), Some("b")]), "a:b");
        assert_eq!(
            roundtrip(vec![Some("a"), Some("b")]),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[test]
    fn test_separator_inside_part() {
        let joined = escape_and_join([Some("a:b"), Some("c")]);
        assert_eq!(joined, "a\\:b:c");
        assert_eq!(
            split_and_unescape(&joined),
            vec![Some("a:b".to_string()), Some("c".to_string())]
        );
    }

    #[test]
    fn test_escape_character_inside_part() {
        let parts = vec![Some("a\\b"), Some("c\\:d")];
        assert_eq!(
            roundtrip(parts),
            vec![Some("a\\b".to_string()), Some("c:d".to_string())]
        );
    }

    #[test]
    fn test_trailing_backslash_in_part() {
        assert_eq!(
            roundtrip(vec![Some("tail\\"), Some("x")]),
            vec![Some("tail\\".to_string()), Some("x".to_string())]
        );
    }

    #[test]
    fn test_null_part() {
        let joined = escape_and_join([Some("k"), None]);
        assert_eq!(joined, "k:\\0");
        assert_eq!(
            split_and_unescape(&joined),
            vec![Some("k".to_string()), None]
        );
    }

    #[test]
    fn test_literal_backslash_zero_is_not_null() {
        // A genuine value "\0" must survive; only the unescaped placeholder
        // token means null.
        assert_eq!(
            roundtrip(vec![Some("\\0")]),
            vec![Some("\\0".to_string())]
        );
    }

    #[test]
    fn test_empty_list() {
        let joined = escape_and_join(std::iter::empty());
        assert_eq!(joined, "\\");
        assert_eq!(split_and_unescape(&joined), Vec::<Option<String>>::new());
    }

    #[test]
    fn test_empty_string_parts() {
        assert_eq!(
            roundtrip(vec![Some(""), Some("")]),
            vec![Some(String::new()), Some(String::new())]
        );
    }

    #[test]
    fn test_single_null_part() {
        assert_eq!(roundtrip(vec![None]), vec![None]);
    }

    #[test]
    fn test_nested_join() {
        // A joined token used as a part of an outer join must round-trip.
        let inner = escape_and_join([Some("n:1"), Some("key"), Some("42"), None]);
        let outer = escape_and_join([Some("delta"), Some(&inner)]);

        let parts = split_and_unescape(&outer);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Some("delta".to_string()));
        assert_eq!(
            split_and_unescape(parts[1].as_ref().unwrap()),
            vec![
                Some("n:1".to_string()),
                Some("key".to_string()),
                Some("42".to_string()),
                None
            ]
        );
    }
}
