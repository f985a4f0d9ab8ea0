//! Scalar text, keys and item headers.

use crate::{
    codec::CodecError,
    constants::{DELETED_MARKER, KEY_SEPARATOR, NULL_LITERAL, OVERRIDE_MARKER, REFERENCE_PREFIX},
    ids::ItemId,
};

/// Characters that start a line with a meaning of their own.
const SPECIAL_LEADS: &[char] = &[
    '!', '"', '\'', '-', '{', '[', '~', '#', '&', '*', '@', '`', '|', '>', '%', '?', ',',
];

/// Text that would read back as something else unless quoted.
fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || matches!(text, NULL_LITERAL | "true" | "false" | "{}" | "[]" | DELETED_MARKER)
        || text.parse::<i64>().is_ok()
        || text.starts_with(REFERENCE_PREFIX)
        || text.starts_with(SPECIAL_LEADS)
        || text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.ends_with(':')
        || text.contains(": ")
        || text.contains(" #")
        || text.chars().any(char::is_control)
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Formats a text value, quoting it when the plain form is ambiguous.
pub(crate) fn format_text(text: &str) -> String {
    if needs_quotes(text) {
        quote(text)
    } else {
        text.to_string()
    }
}

/// Formats a dictionary key. Keys are also quoted when they contain the characters
/// used by item headers.
pub(crate) fn format_key(key: &str) -> String {
    if needs_quotes(key)
        || key.contains(':')
        || key.contains(KEY_SEPARATOR)
        || key.ends_with(OVERRIDE_MARKER)
    {
        quote(key)
    } else {
        key.to_string()
    }
}

/// Reads a text value written by [`format_text`] or [`format_key`].
pub(crate) fn parse_text(raw: &str, line: usize) -> Result<String, CodecError> {
    if !raw.starts_with('"') {
        return Ok(raw.to_string());
    }
    serde_json::from_str::<String>(raw).map_err(|err| CodecError::Malformed {
        line,
        reason: format!("invalid quoted text: {err}"),
    })
}

/// Byte offset just past the closing quote of a quoted text starting at offset 0.
fn quoted_end(raw: &str) -> Option<usize> {
    let mut escaped = false;
    for (offset, c) in raw.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(offset + 1),
            _ => {}
        }
    }
    None
}

/// Splits `key: value` at the first colon outside quotes that is followed by a space
/// or ends the line.
///
/// # Returns
/// The key and the value, `None` for the value when nothing follows the colon, or
/// `None` when the line is not an entry.
pub(crate) fn split_entry(content: &str) -> Option<(&str, Option<&str>)> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (offset, c) in content.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                let rest = &content[offset + 1..];
                if rest.is_empty() || rest.starts_with(' ') {
                    let value = rest.trim();
                    return Some((&content[..offset], (!value.is_empty()).then_some(value)));
                }
            }
            _ => {}
        }
    }
    None
}

/// Header of an identified collection item: `<id>[*][~<key>[*]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemHeader {
    pub id: ItemId,
    /// The value is overridden
    pub overridden: bool,
    /// Dictionary key and whether the key is overridden
    pub key: Option<(String, bool)>,
}

impl ItemHeader {
    pub(crate) fn format(id: ItemId, overridden: bool, key: Option<(&str, bool)>) -> String {
        let mut header = id.to_string();
        if overridden {
            header.push(OVERRIDE_MARKER);
        }
        if let Some((key, key_overridden)) = key {
            header.push(KEY_SEPARATOR);
            header.push_str(&format_key(key));
            if key_overridden {
                header.push(OVERRIDE_MARKER);
            }
        }
        header
    }

    pub(crate) fn parse(raw: &str, line: usize) -> Result<Self, CodecError> {
        let invalid_id = || CodecError::InvalidItemId {
            line,
            value: raw.to_string(),
        };
        let (id_text, rest) = raw.split_at_checked(32).ok_or_else(invalid_id)?;
        let id = id_text.parse::<ItemId>().map_err(|_| invalid_id())?;
        let (overridden, rest) = match rest.strip_prefix(OVERRIDE_MARKER) {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        if rest.is_empty() {
            return Ok(Self {
                id,
                overridden,
                key: None,
            });
        }
        let Some(key_text) = rest.strip_prefix(KEY_SEPARATOR) else {
            return Err(CodecError::Malformed {
                line,
                reason: format!("unexpected text after item id: {rest}"),
            });
        };
        let key = if key_text.starts_with('"') {
            let end = quoted_end(key_text).ok_or_else(|| CodecError::Malformed {
                line,
                reason: "unterminated quoted key".to_string(),
            })?;
            let key = parse_text(&key_text[..end], line)?;
            match &key_text[end..] {
                "" => (key, false),
                "*" => (key, true),
                other => {
                    return Err(CodecError::Malformed {
                        line,
                        reason: format!("unexpected text after key: {other}"),
                    });
                }
            }
        } else {
            match key_text.strip_suffix(OVERRIDE_MARKER) {
                Some(key) => (key.to_string(), true),
                None => (key_text.to_string(), false),
            }
        };
        Ok(Self {
            id,
            overridden,
            key: Some(key),
        })
    }
}

/// Splits the override marker off a member name.
pub(crate) fn member_name(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(OVERRIDE_MARKER) {
        Some(name) => (name, true),
        None => (raw, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_written_as_is() {
        assert_eq!(format_text("String1"), "String1");
        assert_eq!(format_text("two words"), "two words");
        assert_eq!(format_text("a:b"), "a:b");
    }

    #[test]
    fn ambiguous_text_is_quoted() {
        assert_eq!(format_text(""), "\"\"");
        assert_eq!(format_text("null"), "\"null\"");
        assert_eq!(format_text("42"), "\"42\"");
        assert_eq!(format_text("-   item"), "\"-   item\"");
        assert_eq!(format_text("key: value"), "\"key: value\"");
        assert_eq!(format_text("ends:"), "\"ends:\"");
        assert_eq!(format_text("ref!! x"), "\"ref!! x\"");
        assert_eq!(format_text("line\nbreak"), "\"line\\nbreak\"");
    }

    #[test]
    fn keys_with_header_characters_are_quoted() {
        assert_eq!(format_key("Key1"), "Key1");
        assert_eq!(format_key("a~b"), "\"a~b\"");
        assert_eq!(format_key("star*"), "\"star*\"");
        assert_eq!(format_key("a:b"), "\"a:b\"");
    }

    #[test]
    fn quoted_text_reads_back() {
        for text in ["", "null", "key: value", "line\nbreak", "\"quoted\""] {
            assert_eq!(parse_text(&format_text(text), 1).unwrap(), text);
        }
        assert_eq!(parse_text("plain", 1).unwrap(), "plain");
        assert!(parse_text("\"open", 3).unwrap_err().is_malformed());
    }

    #[test]
    fn entries_split_on_the_first_unquoted_colon() {
        assert_eq!(split_entry("Name: value"), Some(("Name", Some("value"))));
        assert_eq!(split_entry("Name:"), Some(("Name", None)));
        assert_eq!(
            split_entry("Archetype: 1234:base.asset"),
            Some(("Archetype", Some("1234:base.asset")))
        );
        assert_eq!(
            split_entry("\"a: b\": value"),
            Some(("\"a: b\"", Some("value")))
        );
        assert_eq!(split_entry("\"a: b\""), None);
        assert_eq!(split_entry("ref!! 1234"), None);
    }

    #[test]
    fn item_headers_carry_override_markers() {
        let id = ItemId::from_seed(3);
        let header = ItemHeader::format(id, true, Some(("Key1", true)));
        assert_eq!(header, format!("{id}*~Key1*"));
        let parsed = ItemHeader::parse(&header, 1).unwrap();
        assert_eq!(parsed.id, id);
        assert!(parsed.overridden);
        assert_eq!(parsed.key, Some(("Key1".to_string(), true)));

        let plain = ItemHeader::parse(&id.to_string(), 1).unwrap();
        assert!(!plain.overridden);
        assert_eq!(plain.key, None);
    }

    #[test]
    fn item_headers_with_quoted_keys() {
        let id = ItemId::from_seed(9);
        let header = ItemHeader::format(id, false, Some(("a~b*", false)));
        let parsed = ItemHeader::parse(&header, 1).unwrap();
        assert_eq!(parsed.key, Some(("a~b*".to_string(), false)));
    }

    #[test]
    fn bad_item_headers_are_rejected() {
        assert!(matches!(
            ItemHeader::parse("not-an-id", 4),
            Err(CodecError::InvalidItemId { line: 4, .. })
        ));
        let id = ItemId::from_seed(1);
        assert!(ItemHeader::parse(&format!("{id}+"), 2).unwrap_err().is_malformed());
    }
}
