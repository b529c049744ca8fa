//! Value-level modification primitives.
//!
//! Handlers sequence these under their own access-control and schema
//! checks; each primitive reports the standard result code for its
//! failure mode.

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{OpError, OpResult};

/// The kind of change a [`Modification`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModOp {
    /// Add values; fails if any is already present.
    Add,
    /// Delete listed values, or the whole attribute when none listed.
    Delete,
    /// Replace all values of the attribute.
    Replace,
    /// Add a signed integer delta to every value.
    Increment,
    /// Add, but "value already exists" is swallowed.
    SoftAdd,
}

/// One element of a modification list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modification {
    /// What to do.
    pub op: ModOp,
    /// Attribute type being changed.
    pub attr: String,
    /// Values the operation carries (may be empty for Delete).
    pub values: Vec<String>,
}

impl Modification {
    /// Creates a modification.
    pub fn new(op: ModOp, attr: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op,
            attr: attr.into(),
            values,
        }
    }

    /// True when this modification touches the `objectClass` attribute.
    pub fn touches_object_class(&self) -> bool {
        self.attr.eq_ignore_ascii_case(crate::entry::ATTR_OBJECT_CLASS)
    }
}

/// Adds values to an attribute, creating it on first use.
pub fn add_values(entry: &mut Entry, attr: &str, values: &[String]) -> OpResult<()> {
    if let Some(existing) = entry.attr(attr) {
        for v in values {
            if existing.values.iter().any(|e| e.eq_ignore_ascii_case(v)) {
                return Err(OpError::TypeOrValueExists(attr.to_string()));
            }
        }
    }
    entry.put_attr(attr, values.to_vec());
    Ok(())
}

/// Deletes listed values, or the whole attribute when `values` is empty.
pub fn delete_values(entry: &mut Entry, attr: &str, values: &[String]) -> OpResult<()> {
    if values.is_empty() {
        if !entry.remove_attr(attr) {
            return Err(OpError::NoSuchAttribute(attr.to_string()));
        }
        return Ok(());
    }
    let a = entry
        .attr_mut(attr)
        .ok_or_else(|| OpError::NoSuchAttribute(attr.to_string()))?;
    for v in values {
        let pos = a
            .values
            .iter()
            .position(|e| e.eq_ignore_ascii_case(v))
            .ok_or_else(|| OpError::NoSuchAttribute(attr.to_string()))?;
        a.values.remove(pos);
    }
    if a.values.is_empty() {
        entry.remove_attr(attr);
    }
    Ok(())
}

/// Replaces all values of an attribute; an empty value list removes it.
pub fn replace_values(entry: &mut Entry, attr: &str, values: &[String]) -> OpResult<()> {
    entry.remove_attr(attr);
    if !values.is_empty() {
        entry.put_attr(attr, values.to_vec());
    }
    Ok(())
}

/// Adds an integer delta to every value of an integer-valued attribute.
pub fn increment_values(entry: &mut Entry, attr: &str, values: &[String]) -> OpResult<()> {
    let delta: i64 = match values {
        [one] => one
            .trim()
            .parse()
            .map_err(|_| OpError::InvalidSyntax(attr.to_string()))?,
        _ => return Err(OpError::InvalidSyntax(attr.to_string())),
    };
    let a = entry
        .attr_mut(attr)
        .ok_or_else(|| OpError::NoSuchAttribute(attr.to_string()))?;
    let mut bumped = Vec::with_capacity(a.values.len());
    for v in &a.values {
        let n: i64 = v
            .trim()
            .parse()
            .map_err(|_| OpError::InvalidSyntax(attr.to_string()))?;
        bumped.push((n + delta).to_string());
    }
    a.values = bumped;
    Ok(())
}

/// Applies one modification, dispatching on its kind. SoftAdd swallows
/// the "already exists" failure.
pub fn apply(entry: &mut Entry, m: &Modification) -> OpResult<()> {
    match m.op {
        ModOp::Add => add_values(entry, &m.attr, &m.values),
        ModOp::Delete => delete_values(entry, &m.attr, &m.values),
        ModOp::Replace => replace_values(entry, &m.attr, &m.values),
        ModOp::Increment => increment_values(entry, &m.attr, &m.values),
        ModOp::SoftAdd => match add_values(entry, &m.attr, &m.values) {
            Err(OpError::TypeOrValueExists(_)) => Ok(()),
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Entry {
        let mut e = Entry::new("cn=x");
        e.put_attr("objectClass", vec!["person".into()]);
        e.put_attr("cn", vec!["x".into()]);
        e
    }

    #[test]
    fn test_add_new_attribute() {
        let mut e = person();
        add_values(&mut e, "sn", &["Smith".into()]).unwrap();
        assert_eq!(e.attr("sn").unwrap().values, vec!["Smith"]);
    }

    #[test]
    fn test_add_duplicate_value_rejected() {
        let mut e = person();
        let err = add_values(&mut e, "cn", &["X".into()]).unwrap_err();
        assert!(matches!(err, OpError::TypeOrValueExists(_)));
    }

    #[test]
    fn test_soft_add_swallows_duplicate() {
        let mut e = person();
        let m = Modification::new(ModOp::SoftAdd, "cn", vec!["X".into()]);
        apply(&mut e, &m).unwrap();
        assert_eq!(e.attr("cn").unwrap().values.len(), 1);
    }

    #[test]
    fn test_delete_specific_value() {
        let mut e = person();
        e.put_attr("member", vec!["a".into(), "b".into()]);
        delete_values(&mut e, "member", &["a".into()]).unwrap();
        assert_eq!(e.attr("member").unwrap().values, vec!["b"]);
    }

    #[test]
    fn test_delete_last_value_drops_attribute() {
        let mut e = person();
        delete_values(&mut e, "cn", &["x".into()]).unwrap();
        assert!(e.attr("cn").is_none());
    }

    #[test]
    fn test_delete_whole_attribute() {
        let mut e = person();
        delete_values(&mut e, "cn", &[]).unwrap();
        assert!(e.attr("cn").is_none());
        assert!(matches!(
            delete_values(&mut e, "cn", &[]),
            Err(OpError::NoSuchAttribute(_))
        ));
    }

    #[test]
    fn test_delete_missing_value() {
        let mut e = person();
        assert!(matches!(
            delete_values(&mut e, "cn", &["y".into()]),
            Err(OpError::NoSuchAttribute(_))
        ));
    }

    #[test]
    fn test_replace() {
        let mut e = person();
        replace_values(&mut e, "cn", &["y".into(), "z".into()]).unwrap();
        assert_eq!(e.attr("cn").unwrap().values, vec!["y", "z"]);
        // replacing an absent attribute creates it
        replace_values(&mut e, "ou", &["People".into()]).unwrap();
        assert_eq!(e.attr("ou").unwrap().values, vec!["People"]);
        // empty replace removes
        replace_values(&mut e, "cn", &[]).unwrap();
        assert!(e.attr("cn").is_none());
    }

    #[test]
    fn test_increment() {
        let mut e = person();
        e.put_attr("uidNumber", vec!["1000".into()]);
        increment_values(&mut e, "uidNumber", &["5".into()]).unwrap();
        assert_eq!(e.attr("uidNumber").unwrap().values, vec!["1005"]);
        increment_values(&mut e, "uidNumber", &["-6".into()]).unwrap();
        assert_eq!(e.attr("uidNumber").unwrap().values, vec!["999"]);
    }

    #[test]
    fn test_increment_rejects_non_integer() {
        let mut e = person();
        assert!(matches!(
            increment_values(&mut e, "cn", &["1".into()]),
            Err(OpError::InvalidSyntax(_))
        ));
        e.put_attr("uidNumber", vec!["1000".into()]);
        assert!(matches!(
            increment_values(&mut e, "uidNumber", &["a".into()]),
            Err(OpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            increment_values(&mut e, "uidNumber", &[]),
            Err(OpError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_touches_object_class() {
        assert!(Modification::new(ModOp::Replace, "ObjectClass", vec![]).touches_object_class());
        assert!(!Modification::new(ModOp::Replace, "cn", vec![]).touches_object_class());
    }
}
