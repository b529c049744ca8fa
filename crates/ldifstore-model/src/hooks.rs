//! Host collaborator contracts.
//!
//! The backend consumes these through trait objects bound at
//! registration time: result delivery, schema and access checks,
//! password verification, and change-sequence-number allocation.
//! Permissive defaults are provided for embedding and tests.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::entry::Entry;
use crate::error::OpResult;
use crate::modify::Modification;

/// Attribute stamped with a new entry's UUID.
pub const ATTR_ENTRY_UUID: &str = "entryUUID";
/// Attribute stamped with the change sequence number of the last write.
pub const ATTR_ENTRY_CSN: &str = "entryCSN";

/// Receives search results as they stream out of the enumerator.
///
/// Returning an error aborts the traversal and becomes the operation's
/// result (cooperative cancellation, e.g. a size limit).
pub trait ResultSink {
    /// Delivers a matching entry, restricted to `attrs` when non-empty.
    fn entry(&mut self, entry: &Entry, attrs: &[String]) -> OpResult<()>;

    /// Delivers a search continuation reference for a referral entry.
    fn reference(&mut self, refs: &[String], entry: &Entry) -> OpResult<()>;
}

/// A sink that buffers everything; useful for embedding and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Entries delivered, in traversal order.
    pub entries: Vec<Entry>,
    /// Reference URL sets delivered, in traversal order.
    pub references: Vec<Vec<String>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// DNs of the collected entries, in order.
    pub fn dns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.dn()).collect()
    }
}

impl ResultSink for CollectingSink {
    fn entry(&mut self, entry: &Entry, attrs: &[String]) -> OpResult<()> {
        let mut kept = entry.clone();
        if !attrs.is_empty() {
            let wanted: Vec<String> = attrs.to_vec();
            let filtered = kept
                .attrs()
                .iter()
                .filter(|a| wanted.iter().any(|w| w.eq_ignore_ascii_case(&a.name)))
                .cloned()
                .collect::<Vec<_>>();
            let mut trimmed = Entry::with_ndn(kept.dn().to_string(), kept.ndn().to_string());
            for a in filtered {
                trimmed.put_attr(&a.name, a.values);
            }
            kept = trimmed;
        }
        self.entries.push(kept);
        Ok(())
    }

    fn reference(&mut self, refs: &[String], _entry: &Entry) -> OpResult<()> {
        self.references.push(refs.to_vec());
        Ok(())
    }
}

/// Validates an entry against the host's schema.
///
/// Called with a mutable entry so the implementation can refresh the
/// cached object-class flags it derives its verdict from.
pub trait SchemaCheck: Send + Sync {
    /// Returns an error when the entry violates the schema.
    fn check(&self, entry: &mut Entry) -> OpResult<()>;
}

/// Schema check that accepts everything, refreshing the flag cache.
#[derive(Debug, Default)]
pub struct PermissiveSchema;

impl SchemaCheck for PermissiveSchema {
    fn check(&self, entry: &mut Entry) -> OpResult<()> {
        entry.refresh_oc_flags();
        Ok(())
    }
}

/// Decides whether a modification list may touch an entry.
pub trait AccessControl: Send + Sync {
    /// Returns false to deny the whole modification list.
    fn allow_mods(&self, entry: &Entry, mods: &[Modification]) -> bool;
}

/// Access control that allows everything.
#[derive(Debug, Default)]
pub struct AllowAllAcl;

impl AccessControl for AllowAllAcl {
    fn allow_mods(&self, _entry: &Entry, _mods: &[Modification]) -> bool {
        true
    }
}

/// Verifies a bind credential against an entry's stored values.
pub trait PasswordCheck: Send + Sync {
    /// Returns true when `cred` matches one of `stored`.
    fn verify(&self, entry: &Entry, stored: &[String], cred: &str) -> bool;
}

/// Plaintext comparison; real hosts hash.
#[derive(Debug, Default)]
pub struct PlaintextPasswords;

impl PasswordCheck for PlaintextPasswords {
    fn verify(&self, _entry: &Entry, stored: &[String], cred: &str) -> bool {
        stored.iter().any(|s| s == cred)
    }
}

/// Allocates change sequence numbers for write operations.
pub trait CsnAllocator: Send + Sync {
    /// Returns the next CSN; strictly increasing per allocator.
    fn next(&self) -> String;
}

/// Monotonic counter CSNs, zero-padded so string order is numeric order.
#[derive(Debug, Default)]
pub struct SerialCsn {
    counter: AtomicU64,
}

impl SerialCsn {
    /// Creates an allocator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CsnAllocator for SerialCsn {
    fn next(&self) -> String {
        format!("{:020}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Stamps the operational attributes a freshly added entry carries.
pub fn stamp_add_operational(entry: &mut Entry, csn: &dyn CsnAllocator) {
    if entry.attr(ATTR_ENTRY_UUID).is_none() {
        entry.put_attr(ATTR_ENTRY_UUID, vec![uuid::Uuid::new_v4().to_string()]);
    }
    entry.remove_attr(ATTR_ENTRY_CSN);
    entry.put_attr(ATTR_ENTRY_CSN, vec![csn.next()]);
}

/// Refreshes the CSN stamp after a successful modification.
pub fn stamp_modify_operational(entry: &mut Entry, csn: &dyn CsnAllocator) {
    entry.remove_attr(ATTR_ENTRY_CSN);
    entry.put_attr(ATTR_ENTRY_CSN, vec![csn.next()]);
}

/// Rewrites referral URLs for a shadowed request: a URL with no DN part
/// gets the target DN appended; URLs that already name a DN pass through.
pub fn referral_rewrite(refs: &[String], target_dn: &str) -> Vec<String> {
    refs.iter()
        .map(|url| {
            let Some(scheme_end) = url.find("://") else {
                return url.clone();
            };
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                None => format!("{url}/{target_dn}"),
                Some(i) if rest[i + 1..].is_empty() => format!("{url}{target_dn}"),
                Some(_) => url.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_respects_attr_list() {
        let mut e = Entry::new("cn=x");
        e.put_attr("cn", vec!["x".into()]);
        e.put_attr("sn", vec!["y".into()]);

        let mut sink = CollectingSink::new();
        sink.entry(&e, &["cn".into()]).unwrap();
        let got = &sink.entries[0];
        assert!(got.attr("cn").is_some());
        assert!(got.attr("sn").is_none());

        sink.entry(&e, &[]).unwrap();
        assert!(sink.entries[1].attr("sn").is_some());
    }

    #[test]
    fn test_serial_csn_is_increasing() {
        let csn = SerialCsn::new();
        let a = csn.next();
        let b = csn.next();
        assert!(b > a);
    }

    #[test]
    fn test_stamp_add_sets_uuid_and_csn() {
        let mut e = Entry::new("cn=x");
        let csn = SerialCsn::new();
        stamp_add_operational(&mut e, &csn);
        assert!(e.attr(ATTR_ENTRY_UUID).is_some());
        assert!(e.attr(ATTR_ENTRY_CSN).is_some());

        let first = e.attr(ATTR_ENTRY_CSN).unwrap().values[0].clone();
        stamp_modify_operational(&mut e, &csn);
        assert!(e.attr(ATTR_ENTRY_CSN).unwrap().values[0] > first);
        // UUID survives restamping
        assert_eq!(e.attr(ATTR_ENTRY_UUID).unwrap().values.len(), 1);
    }

    #[test]
    fn test_plaintext_password_check() {
        let e = Entry::new("cn=x");
        let pw = PlaintextPasswords;
        assert!(pw.verify(&e, &["secret".into()], "secret"));
        assert!(!pw.verify(&e, &["secret".into()], "Secret"));
        assert!(!pw.verify(&e, &[], "secret"));
    }

    #[test]
    fn test_referral_rewrite() {
        let refs = vec![
            "ldap://a.example.com".to_string(),
            "ldap://b.example.com/".to_string(),
            "ldap://c.example.com/dc=other".to_string(),
            "not a url".to_string(),
        ];
        let out = referral_rewrite(&refs, "ou=R,dc=example,dc=com");
        assert_eq!(out[0], "ldap://a.example.com/ou=R,dc=example,dc=com");
        assert_eq!(out[1], "ldap://b.example.com/ou=R,dc=example,dc=com");
        assert_eq!(out[2], "ldap://c.example.com/dc=other");
        assert_eq!(out[3], "not a url");
    }
}
