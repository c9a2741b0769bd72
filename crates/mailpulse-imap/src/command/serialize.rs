//! Command serialization helpers.

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut String, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push('"');
        for c in s.chars() {
            if c == '"' || c == '\\' {
                buf.push('\\');
            }
            buf.push(c);
        }
        buf.push('"');
    } else {
        buf.push_str(s);
    }
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn astring(s: &str) -> String {
        let mut buf = String::new();
        write_astring(&mut buf, s);
        buf
    }

    #[test]
    fn test_atom_passes_through() {
        assert_eq!(astring("INBOX"), "INBOX");
        assert_eq!(astring("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(astring(""), "\"\"");
        assert_eq!(astring("two words"), "\"two words\"");
        assert_eq!(astring("pa\"ss\\word"), "\"pa\\\"ss\\\\word\"");
    }
}
