//! Property-based tests for the DN-to-path codec.
//!
//! Two invariants: distinct normalized DNs under one suffix never map
//! to the same path, and every emitted path component is safe for the
//! host filesystem.

use proptest::prelude::*;

use ldifstore_backend::codec;
use ldifstore_model::dn;

const BASE: &str = "/var/db";
const SUFFIX: &str = "dc=example,dc=com";

/// Printable-ASCII RDN values, including the separators and specials
/// the codec has to escape.
fn any_value() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[ -~]{1,16}").expect("regex")
}

fn any_attr() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z][a-zA-Z0-9]{0,8}").expect("regex")
}

/// A normalized DN one or two RDNs below the suffix. Degenerate shapes
/// a host normalizer would reject (empty RDN components) are filtered.
fn any_ndn() -> impl Strategy<Value = String> {
    (any_attr(), any_value(), proptest::option::of((any_attr(), any_value())))
        .prop_map(|(a1, v1, second)| {
            let mut raw = format!("{a1}={v1},{SUFFIX}");
            if let Some((a2, v2)) = second {
                raw = format!("{a2}={v2},{raw}");
            }
            dn::normalize(&raw)
        })
        .prop_filter("no empty rdn components", |ndn| {
            dn::split_unescaped(ndn, b',').iter().all(|r| !r.is_empty())
        })
}

proptest! {
    #[test]
    fn test_injectivity(ndn1 in any_ndn(), ndn2 in any_ndn()) {
        prop_assume!(dn::is_suffix(&ndn1, SUFFIX) && dn::is_suffix(&ndn2, SUFFIX));
        let p1 = codec::dn_to_path(BASE, SUFFIX, &ndn1);
        let p2 = codec::dn_to_path(BASE, SUFFIX, &ndn2);
        if ndn1 == ndn2 {
            prop_assert_eq!(p1, p2);
        } else {
            prop_assert_ne!(p1, p2);
        }
    }

    #[test]
    #[cfg(not(windows))]
    fn test_components_are_filename_safe(ndn in any_ndn()) {
        prop_assume!(dn::is_suffix(&ndn, SUFFIX));
        let path = codec::dn_to_path(BASE, SUFFIX, &ndn);
        let rel = path.strip_prefix(BASE).unwrap();
        for component in rel.split('/').filter(|c| !c.is_empty()) {
            prop_assert!(!component.is_empty());
            prop_assert_ne!(component, ".");
            prop_assert_ne!(component, "..");
            for b in component.bytes() {
                prop_assert!(b != b'/' && b != b':', "unsafe byte {b:#x} in {component:?}");
            }
        }
    }

    #[test]
    fn test_path_stays_under_base(ndn in any_ndn()) {
        prop_assume!(dn::is_suffix(&ndn, SUFFIX));
        let path = codec::dn_to_path(BASE, SUFFIX, &ndn);
        prop_assert!(path.starts_with(BASE));
        prop_assert!(path.ends_with(codec::LDIF_SUFFIX));
    }

    #[test]
    fn test_dir_helpers_are_length_only(ndn in any_ndn()) {
        prop_assume!(dn::is_suffix(&ndn, SUFFIX));
        let path = codec::dn_to_path(BASE, SUFFIX, &ndn);
        let dir = codec::entry_to_dir(&path);
        prop_assert_eq!(codec::dir_to_entry(dir), path.clone());
        prop_assert_eq!(dir.len() + codec::LDIF_SUFFIX.len(), path.len());
    }
}
