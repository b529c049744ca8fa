//! Scoped enumeration of the mirrored directory tree.
//!
//! Depth-first, parent before children. Siblings are visited in sorted
//! order: names carrying a bracketed ordering integer (`{2}mdb.ldif`)
//! sort by the filename prefix up to the digits and then numerically,
//! so `{10}` follows `{9}`; plain names sort by raw bytes.

use std::cmp::Ordering;
use std::io::ErrorKind;
use std::path::MAIN_SEPARATOR;

use tracing::{debug, warn};

use ldifstore_model::{dn, hooks, Entry, OpError, OpResult, ResultSink, Scope};

use crate::backend::SearchRequest;
use crate::codec::{self, IX_FSL, IX_FSR, LDIF_SUFFIX};
use crate::fileio;

/// State threaded through one enumeration: the request, and either a
/// streaming sink or (tool mode) a buffer of collected entries.
pub(crate) struct EnumCookie<'a> {
    pub(crate) req: &'a SearchRequest,
    pub(crate) sink: Option<&'a mut dyn ResultSink>,
    pub(crate) entries: Vec<Entry>,
}

/// Runs the enumeration rooted at the request base. The empty-DN base
/// is synthetic: nothing is visited at the top, the base directory is
/// opened directly, and the suffix entry is enumerated as an ordinary
/// child. Entry files store only their leaf RDN, so the synthetic
/// level's parent DNs come from the suffix (its children append them
/// when rebuilding full DNs), not from the empty request base.
pub(crate) fn enum_tree(
    base: &str,
    suffix_dn: &str,
    suffix_ndn: &str,
    ck: &mut EnumCookie<'_>,
) -> OpResult<()> {
    let synthetic = ck.req.base_ndn.is_empty();
    let (pdn, pndn) = if synthetic {
        (
            dn::parent(suffix_dn).to_string(),
            dn::parent(suffix_ndn).to_string(),
        )
    } else {
        (
            dn::parent(&ck.req.base_dn).to_string(),
            dn::parent(&ck.req.base_ndn).to_string(),
        )
    };
    let path = codec::dn_to_path(base, suffix_ndn, &ck.req.base_ndn);
    let scope = ck.req.scope;
    enumerate(ck, &path, scope, synthetic, &pdn, &pndn)
}

fn enumerate(
    ck: &mut EnumCookie<'_>,
    path: &str,
    scope: Scope,
    synthetic: bool,
    pdn: &str,
    pndn: &str,
) -> OpResult<()> {
    let mut this_entry = None;

    if !synthetic {
        let entry = match fileio::read_entry(path, Some((pdn, pndn))) {
            Ok(e) => e,
            Err(_) => return Err(OpError::NoSuchObject),
        };

        if matches!(scope, Scope::Base | Scope::Subtree) {
            match ck.sink.as_deref_mut() {
                Some(sink) => {
                    // A referral shadows everything below it unless the
                    // caller asked to manage DSA objects directly. The
                    // search base itself only gets referral treatment
                    // in subtree scope.
                    if !ck.req.manage_dsa_it && scope != Scope::Base && entry.is_referral() {
                        let urls = entry.referral_urls().unwrap_or(&[]);
                        let refs = hooks::referral_rewrite(urls, entry.dn());
                        debug!(dn = entry.dn(), "sending search reference");
                        sink.reference(&refs, &entry)?;
                    } else if ck.req.filter.matches(&entry) {
                        sink.entry(&entry, &ck.req.attrs)?;
                    }
                }
                // Tool mode collects every entry, unfiltered.
                None => ck.entries.push(entry.clone()),
            }
        }
        this_entry = Some(entry);
    }

    if scope != Scope::Base {
        let dir = codec::entry_to_dir(path);
        let children = read_sorted_children(dir)?;

        let child_scope = match scope {
            Scope::OneLevel => Scope::Base,
            Scope::Subordinate => Scope::Subtree,
            s => s,
        };
        let (cpdn, cpndn) = match &this_entry {
            Some(e) => (e.dn(), e.ndn()),
            None => (pdn, pndn),
        };
        let (cpdn, cpndn) = (cpdn.to_string(), cpndn.to_string());

        for name in children {
            let child_path = format!("{dir}{MAIN_SEPARATOR}{name}");
            enumerate(ck, &child_path, child_scope, false, &cpdn, &cpndn)?;
        }
    }

    Ok(())
}

/// A directory child with its sibling sort key. For a bracketed name
/// the primary key is the prefix up to the first digit and the bracket
/// integer is the secondary key; otherwise the whole name compares by
/// raw bytes.
struct SortName {
    name: String,
    key_end: usize,
    num: Option<i64>,
}

impl SortName {
    fn new(name: String) -> Self {
        if let Some(l) = name.bytes().position(|b| b == IX_FSL) {
            let inner = &name[l + 1..];
            if let Some(r) = inner.bytes().position(|b| b == IX_FSR) {
                let num = parse_leading_int(&inner[..r]);
                return SortName {
                    key_end: l + 1,
                    num: Some(num),
                    name,
                };
            }
        }
        SortName {
            key_end: name.len(),
            num: None,
            name,
        }
    }

    fn primary(&self) -> &str {
        &self.name[..self.key_end]
    }
}

/// Leading optional-sign decimal parse; anything else counts as zero,
/// digits stop at the first non-digit.
fn parse_leading_int(s: &str) -> i64 {
    let bytes = s.as_bytes();
    let (neg, mut i) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let mut n: i64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        n = n.saturating_mul(10).saturating_add((bytes[i] - b'0') as i64);
        i += 1;
    }
    if neg {
        -n
    } else {
        n
    }
}

/// Reads a subtree directory and returns its `.ldif` children in
/// sibling sort order. A missing directory means a childless entry.
fn read_sorted_children(dir: &str) -> OpResult<Vec<String>> {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            warn!(dir, error = %e, "failed to open subtree directory");
            return Err(OpError::Busy);
        }
    };

    let mut list: Vec<SortName> = Vec::new();
    for dent in rd {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!(dir, error = %e, "failed to read subtree directory");
                return Err(OpError::Busy);
            }
        };
        let name = dent.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.len() <= LDIF_SUFFIX.len() || !name.ends_with(LDIF_SUFFIX) {
            continue;
        }
        insert_sorted(&mut list, SortName::new(name.to_string()));
    }

    Ok(list.into_iter().map(|s| s.name).collect())
}

/// Stable insertion by (primary, numeric) key, ascending.
fn insert_sorted(list: &mut Vec<SortName>, item: SortName) {
    let mut at = list.len();
    for (i, other) in list.iter().enumerate() {
        let mut cmp = item.primary().cmp(other.primary());
        if cmp == Ordering::Equal {
            if let (Some(a), Some(b)) = (item.num, other.num) {
                cmp = a.cmp(&b);
            }
        }
        if cmp == Ordering::Less {
            at = i;
            break;
        }
    }
    list.insert(at, item);
}
