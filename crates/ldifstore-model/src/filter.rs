//! Search filters and their string form.
//!
//! Covers the filter shapes the backend's candidate testing needs:
//! presence, equality, substrings, and the and/or/not combinators.
//! Matching is ASCII case-insensitive on both attribute types and
//! values, consistent with DN normalization.

use thiserror::Error;

use crate::entry::Entry;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// At least one sub-filter must match.
    Or(Vec<Filter>),
    /// The sub-filter must not match.
    Not(Box<Filter>),
    /// The attribute must exist (`(attr=*)`).
    Present(String),
    /// The attribute must hold the value.
    Equality(String, String),
    /// Substring match with optional anchors (`(cn=al*ce*e)`).
    Substrings {
        /// Attribute type.
        attr: String,
        /// Required prefix.
        initial: Option<String>,
        /// Required interior fragments, in order.
        any: Vec<String>,
        /// Required suffix.
        fin: Option<String>,
    },
}

/// Filter string parse failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    /// The string ended inside a filter.
    #[error("unexpected end of filter")]
    UnexpectedEnd,
    /// An unexpected character at the given byte offset.
    #[error("unexpected character at offset {0}")]
    Unexpected(usize),
}

impl Filter {
    /// The filter matching every entry: `(objectClass=*)`.
    pub fn match_all() -> Filter {
        Filter::Present("objectClass".into())
    }

    /// Tests an entry against this filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(fs) => fs.iter().all(|f| f.matches(entry)),
            Filter::Or(fs) => fs.iter().any(|f| f.matches(entry)),
            Filter::Not(f) => !f.matches(entry),
            Filter::Present(attr) => entry.attr(attr).is_some(),
            Filter::Equality(attr, value) => entry
                .attr(attr)
                .map(|a| a.values.iter().any(|v| v.eq_ignore_ascii_case(value)))
                .unwrap_or(false),
            Filter::Substrings {
                attr,
                initial,
                any,
                fin,
            } => entry
                .attr(attr)
                .map(|a| {
                    a.values
                        .iter()
                        .any(|v| substrings_match(v, initial, any, fin))
                })
                .unwrap_or(false),
        }
    }

    /// Parses a parenthesized filter string, e.g.
    /// `(&(objectClass=person)(cn=al*))`.
    pub fn parse(s: &str) -> Result<Filter, FilterParseError> {
        let mut p = Parser {
            bytes: s.as_bytes(),
            pos: 0,
        };
        let f = p.filter()?;
        if p.pos != p.bytes.len() {
            return Err(FilterParseError::Unexpected(p.pos));
        }
        Ok(f)
    }
}

fn substrings_match(
    value: &str,
    initial: &Option<String>,
    any: &[String],
    fin: &Option<String>,
) -> bool {
    let v = value.to_ascii_lowercase();
    let mut at = 0;
    if let Some(pre) = initial {
        if !v.starts_with(&pre.to_ascii_lowercase()) {
            return false;
        }
        at = pre.len();
    }
    for frag in any {
        let frag = frag.to_ascii_lowercase();
        match v[at..].find(&frag) {
            Some(i) => at += i + frag.len(),
            None => return false,
        }
    }
    if let Some(suf) = fin {
        let suf = suf.to_ascii_lowercase();
        return v.len() >= at + suf.len() && v.ends_with(&suf);
    }
    true
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn expect(&mut self, b: u8) -> Result<(), FilterParseError> {
        if self.bytes.get(self.pos) == Some(&b) {
            self.pos += 1;
            Ok(())
        } else if self.pos >= self.bytes.len() {
            Err(FilterParseError::UnexpectedEnd)
        } else {
            Err(FilterParseError::Unexpected(self.pos))
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterParseError> {
        self.expect(b'(')?;
        let f = match self.bytes.get(self.pos) {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(FilterParseError::UnexpectedEnd),
        };
        self.expect(b')')?;
        Ok(f)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterParseError> {
        let mut out = Vec::new();
        while self.bytes.get(self.pos) == Some(&b'(') {
            out.push(self.filter()?);
        }
        if out.is_empty() {
            return Err(FilterParseError::Unexpected(self.pos));
        }
        Ok(out)
    }

    fn item(&mut self) -> Result<Filter, FilterParseError> {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'=' {
                break;
            }
            if b == b'(' || b == b')' {
                return Err(FilterParseError::Unexpected(self.pos));
            }
            self.pos += 1;
        }
        let attr = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        if attr.is_empty() {
            return Err(FilterParseError::Unexpected(start));
        }
        self.expect(b'=')?;

        let vstart = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b')' {
                break;
            }
            self.pos += 1;
        }
        let raw = String::from_utf8_lossy(&self.bytes[vstart..self.pos]).into_owned();

        if raw == "*" {
            return Ok(Filter::Present(attr));
        }
        if !raw.contains('*') {
            return Ok(Filter::Equality(attr, raw));
        }

        let parts: Vec<&str> = raw.split('*').collect();
        let initial = (!parts[0].is_empty()).then(|| parts[0].to_string());
        let fin = (!parts[parts.len() - 1].is_empty()).then(|| parts[parts.len() - 1].to_string());
        let any = parts[1..parts.len() - 1]
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect();
        Ok(Filter::Substrings {
            attr,
            initial,
            any,
            fin,
        })
    }
}
