//! The LDIF single-entry text format.
//!
//! One entry per file: a `dn:` line followed by one `attr: value` line
//! per value. Values that are unsafe in the textual form (leading space,
//! `:` or `<`, trailing space, control or non-ASCII bytes) are written
//! base64-encoded on an `attr::` line. The parser unfolds continuation
//! lines (a leading space joins the previous line) and skips `#`
//! comments and a leading `version:` line.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

use crate::entry::Entry;

/// Parse failures for LDIF entry text.
#[derive(Debug, Error)]
pub enum LdifError {
    /// The record does not start with a `dn:` line.
    #[error("missing dn line")]
    MissingDn,

    /// A line has no `:` separator.
    #[error("malformed line {0}")]
    BadLine(usize),

    /// A `::` value is not valid base64.
    #[error("bad base64 on line {0}")]
    BadBase64(usize),

    /// A base64 value does not decode to UTF-8 text.
    #[error("value on line {0} is not utf-8")]
    NotUtf8(usize),
}

fn needs_base64(v: &str) -> bool {
    if v.is_empty() {
        return false;
    }
    let bytes = v.as_bytes();
    matches!(bytes[0], b' ' | b':' | b'<')
        || bytes[bytes.len() - 1] == b' '
        || bytes.iter().any(|&b| b < 0x20 || b >= 0x7f)
}

fn put_line(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    if needs_base64(value) {
        out.push_str(":: ");
        out.push_str(&BASE64.encode(value.as_bytes()));
    } else {
        out.push_str(": ");
        out.push_str(value);
    }
    out.push('\n');
}

/// Serializes an entry to LDIF text. The `dn:` line carries whatever DN
/// the entry currently holds; the backend shortens it to the leaf RDN
/// before writing an entry file.
pub fn entry_to_ldif(entry: &Entry) -> String {
    let mut out = String::with_capacity(64 + entry.dn().len());
    put_line(&mut out, "dn", entry.dn());
    for attr in entry.attrs() {
        for value in &attr.values {
            put_line(&mut out, &attr.name, value);
        }
    }
    out
}

/// Parses a single LDIF record into an entry. The entry's normalized DN
/// is derived from the `dn:` line.
pub fn entry_from_ldif(text: &str) -> Result<Entry, LdifError> {
    let mut entry: Option<Entry> = None;

    for (lineno, logical) in unfold(text) {
        let (name, rest) = logical
            .split_once(':')
            .ok_or(LdifError::BadLine(lineno))?;
        let value = if let Some(b64) = rest.strip_prefix(':') {
            let decoded = BASE64
                .decode(b64.trim_start().as_bytes())
                .map_err(|_| LdifError::BadBase64(lineno))?;
            String::from_utf8(decoded).map_err(|_| LdifError::NotUtf8(lineno))?
        } else {
            rest.trim_start().to_string()
        };

        match entry {
            None => {
                if name.eq_ignore_ascii_case("version") {
                    continue;
                }
                if !name.eq_ignore_ascii_case("dn") {
                    return Err(LdifError::MissingDn);
                }
                entry = Some(Entry::new(value));
            }
            Some(ref mut e) => {
                e.put_attr(name, vec![value]);
            }
        }
    }

    let mut e = entry.ok_or(LdifError::MissingDn)?;
    e.refresh_oc_flags();
    Ok(e)
}

/// Unfolds continuation lines, dropping comments and blanks. Yields
/// (first physical line number, logical line) pairs.
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    let mut in_comment = false;
    for (i, line) in text.lines().enumerate() {
        if let Some(cont) = line.strip_prefix(' ') {
            if !in_comment {
                if let Some((_, last)) = out.last_mut() {
                    last.push_str(cont);
                }
            }
            continue;
        }
        if line.is_empty() {
            in_comment = false;
            continue;
        }
        if line.starts_with('#') {
            in_comment = true;
            continue;
        }
        in_comment = false;
        out.push((i + 1, line.to_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_simple_entry() {
        let mut e = Entry::new("cn=Alice");
        e.put_attr("objectClass", vec!["person".into()]);
        e.put_attr("cn", vec!["Alice".into()]);
        e.put_attr("sn", vec!["Smith".into()]);

        let text = entry_to_ldif(&e);
        let parsed = entry_from_ldif(&text).unwrap();
        assert_eq!(parsed.dn(), "cn=Alice");
        assert_eq!(parsed.attr("cn").unwrap().values, vec!["Alice"]);
        assert_eq!(parsed.attr("sn").unwrap().values, vec!["Smith"]);
    }

    #[test]
    fn test_unsafe_values_are_base64() {
        let mut e = Entry::new("cn=x");
        e.put_attr("description", vec![" leading space".into()]);
        let text = entry_to_ldif(&e);
        assert!(text.contains("description:: "));
        let parsed = entry_from_ldif(&text).unwrap();
        assert_eq!(parsed.attr("description").unwrap().values[0], " leading space");
    }

    #[test]
    fn test_non_ascii_roundtrip() {
        let mut e = Entry::new("cn=x");
        e.put_attr("description", vec!["naïve café".into()]);
        let text = entry_to_ldif(&e);
        assert!(text.contains("description:: "));
        let parsed = entry_from_ldif(&text).unwrap();
        assert_eq!(parsed.attr("description").unwrap().values[0], "naïve café");
    }

    #[test]
    fn test_continuation_lines_unfold() {
        let text = "dn: cn=x\ndescription: part one\n  and part two\n";
        let e = entry_from_ldif(text).unwrap();
        assert_eq!(
            e.attr("description").unwrap().values[0],
            "part one and part two"
        );
    }

    #[test]
    fn test_comments_and_version_skipped() {
        let text = "# a comment\nversion: 1\ndn: cn=x\ncn: x\n";
        let e = entry_from_ldif(text).unwrap();
        assert_eq!(e.dn(), "cn=x");
    }

    #[test]
    fn test_missing_dn_rejected() {
        assert!(matches!(
            entry_from_ldif("cn: x\n"),
            Err(LdifError::MissingDn)
        ));
        assert!(matches!(entry_from_ldif(""), Err(LdifError::MissingDn)));
    }

    #[test]
    fn test_malformed_line_rejected() {
        let text = "dn: cn=x\nnot a line\n";
        assert!(matches!(entry_from_ldif(text), Err(LdifError::BadLine(2))));
    }

    #[test]
    fn test_multivalued_attr_order_kept() {
        let text = "dn: cn=x\nmember: a\nmember: b\nmember: c\n";
        let e = entry_from_ldif(text).unwrap();
        assert_eq!(e.attr("member").unwrap().values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parser_primes_oc_flags() {
        let text = "dn: ou=R\nobjectClass: referral\nref: ldap://elsewhere/\n";
        let e = entry_from_ldif(text).unwrap();
        assert!(e.is_referral());
    }
}
