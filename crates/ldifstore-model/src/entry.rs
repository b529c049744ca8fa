//! Directory entries: an ordered attribute list keyed by a DN.

use crate::dn;

/// The attribute holding an entry's object classes.
pub const ATTR_OBJECT_CLASS: &str = "objectClass";
/// The attribute holding referral target URLs.
pub const ATTR_REF: &str = "ref";
/// The attribute checked by bind.
pub const ATTR_USER_PASSWORD: &str = "userPassword";
/// The object class marking an entry as a referral.
pub const OC_REFERRAL: &str = "referral";

const FLAG_COMPUTED: u8 = 0x01;
const FLAG_REFERRAL: u8 = 0x02;

/// One attribute: a type name and its ordered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type in its presentation case.
    pub name: String,
    /// Values in insertion order.
    pub values: Vec<String>,
}

impl Attribute {
    /// Creates an attribute from a name and values.
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// An entry: DN (presentation and normalized forms) plus attributes.
///
/// The object-class flags are a lazily computed cache; mutations that
/// touch `objectClass` must call [`Entry::invalidate_oc_flags`].
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    nname: String,
    attrs: Vec<Attribute>,
    flags: u8,
}

impl Entry {
    /// Creates an empty entry with the given presentation DN; the
    /// normalized form is derived.
    pub fn new(dn: impl Into<String>) -> Self {
        let name = dn.into();
        let nname = dn::normalize(&name);
        Self {
            name,
            nname,
            attrs: Vec::new(),
            flags: 0,
        }
    }

    /// Creates an entry with explicit presentation and normalized DNs.
    pub fn with_ndn(dn: impl Into<String>, ndn: impl Into<String>) -> Self {
        Self {
            name: dn.into(),
            nname: ndn.into(),
            attrs: Vec::new(),
            flags: 0,
        }
    }

    /// The presentation DN.
    pub fn dn(&self) -> &str {
        &self.name
    }

    /// The normalized DN.
    pub fn ndn(&self) -> &str {
        &self.nname
    }

    /// Replaces both DN forms, e.g. after a rename or when the full DN
    /// is reconstructed from a stored leaf RDN.
    pub fn set_dn(&mut self, dn: impl Into<String>, ndn: impl Into<String>) {
        self.name = dn.into();
        self.nname = ndn.into();
    }

    /// All attributes in order.
    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Looks up an attribute by type, ASCII case-insensitively.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Mutable variant of [`Entry::attr`].
    pub fn attr_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Appends an attribute, merging values into an existing one of the
    /// same type.
    pub fn put_attr(&mut self, name: &str, values: Vec<String>) {
        match self.attr_mut(name) {
            Some(a) => a.values.extend(values),
            None => self.attrs.push(Attribute::new(name, values)),
        }
    }

    /// Removes an attribute entirely. Returns true if it existed.
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
        before != self.attrs.len()
    }

    /// True if the entry carries the given object class.
    pub fn has_object_class(&self, oc: &str) -> bool {
        self.attr(ATTR_OBJECT_CLASS)
            .map(|a| a.values.iter().any(|v| v.eq_ignore_ascii_case(oc)))
            .unwrap_or(false)
    }

    /// Drops the cached object-class flags. Must be called when a
    /// modification touches `objectClass`.
    pub fn invalidate_oc_flags(&mut self) {
        self.flags = 0;
    }

    /// Recomputes the object-class flags from the current attributes.
    pub fn refresh_oc_flags(&mut self) {
        let mut flags = FLAG_COMPUTED;
        if self.has_object_class(OC_REFERRAL) {
            flags |= FLAG_REFERRAL;
        }
        self.flags = flags;
    }

    /// True if the entry is a referral object (object class `referral`
    /// with at least one `ref` value).
    pub fn is_referral(&self) -> bool {
        let marked = if self.flags & FLAG_COMPUTED != 0 {
            self.flags & FLAG_REFERRAL != 0
        } else {
            self.has_object_class(OC_REFERRAL)
        };
        marked && self.attr(ATTR_REF).map(|a| !a.values.is_empty()).unwrap_or(false)
    }

    /// The referral target URLs, if any.
    pub fn referral_urls(&self) -> Option<&[String]> {
        self.attr(ATTR_REF).map(|a| a.values.as_slice())
    }

    /// The stored password values, if any.
    pub fn password_values(&self) -> Option<&[String]> {
        self.attr(ATTR_USER_PASSWORD).map(|a| a.values.as_slice())
    }
}
