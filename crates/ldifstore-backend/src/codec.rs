//! DN-to-path encoding.
//!
//! Every normalized DN under the suffix maps to exactly one `.ldif`
//! file path below the base directory: one path component per DN
//! component, root to leaf, with the whole suffix as the deepest-level
//! directory name. The mapping is injective and every emitted component
//! is a valid filename on the host filesystem; it is never parsed back
//! (entries carry their own DNs).

use std::path::MAIN_SEPARATOR;

use ldifstore_model::dn;

/// Filename suffix of entry files.
pub const LDIF_SUFFIX: &str = ".ldif";

const FILETYPE_SEP: u8 = b'.';

/// Left/right brackets of ordered RDN values (`olcDatabase={1}mdb`) as
/// they appear in DNs.
const IX_DNL: u8 = b'{';
const IX_DNR: u8 = b'}';

/// Their filename counterparts. Identical to the DN form on platforms
/// where `{`/`}` are filename-safe.
pub(crate) const IX_FSL: u8 = IX_DNL;
pub(crate) const IX_FSR: u8 = IX_DNR;

#[cfg(not(windows))]
mod platform {
    /// Escape byte introducing a hex-escaped character.
    pub const ESCAPE_CHAR: u8 = b'\\';

    /// `:` is escaped alongside `/` so Unix and macOS variants produce
    /// identical trees.
    pub const fn is_unsafe(c: u8) -> bool {
        matches!(c, b'/' | b':')
    }
}

#[cfg(windows)]
mod platform {
    /// `\` is itself unsafe on Windows, so a substitute escape byte.
    pub const ESCAPE_CHAR: u8 = b'^';

    pub const fn is_unsafe(c: u8) -> bool {
        matches!(
            c,
            b'/' | b':' | b'<' | b'>' | b'"' | b'|' | b'?' | b'*'
        )
    }
}

pub(crate) use platform::{is_unsafe, ESCAPE_CHAR};

/// True for characters that get special handling besides the unsafe set:
/// the escape byte and bracket substitutes when they are not already
/// special, and the filename-suffix separator always (an RDN ending in
/// ".ldif" must not collide with an entry file of the same name).
const fn maybe_unsafe(c: u8, x: u8) -> bool {
    !(is_unsafe(x) || x == b'\\' || x == IX_DNL || x == IX_DNR) && c == x
}

const fn need_escape(c: u8) -> bool {
    is_unsafe(c)
        || maybe_unsafe(c, ESCAPE_CHAR)
        || maybe_unsafe(c, FILETYPE_SEP)
        || maybe_unsafe(c, IX_FSL)
        || (IX_FSR != IX_FSL && maybe_unsafe(c, IX_FSR))
}

// The chosen escape byte and brackets must themselves be storable, and
// '-' must survive for ordered frontend entries like "{-1}frontend".
const _: () = {
    assert!(!is_unsafe(b'-'));
    assert!(!is_unsafe(ESCAPE_CHAR));
    assert!(!is_unsafe(IX_FSL));
    assert!(!is_unsafe(IX_FSR));
};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Encodes one DN component (an RDN, or the whole suffix) into a
/// filename fragment. Escaping only ever touches ASCII bytes, so UTF-8
/// sequences pass through intact.
fn encode_component(out: &mut String, component: &str) {
    for ch in component.chars() {
        if !ch.is_ascii() {
            out.push(ch);
            continue;
        }
        let b = ch as u8;
        if ESCAPE_CHAR != b'\\' && b == b'\\' {
            out.push(ESCAPE_CHAR as char);
        } else if IX_FSL != IX_DNL && b == IX_DNL {
            out.push(IX_FSL as char);
        } else if IX_FSR != IX_DNR && b == IX_DNR {
            out.push(IX_FSR as char);
        } else if need_escape(b) {
            out.push(ESCAPE_CHAR as char);
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        } else {
            out.push(ch);
        }
    }
}

/// Maps a normalized DN under `suffix_ndn` to its entry file path below
/// `base`. A non-empty DN must sit under the suffix. The empty DN names
/// the synthetic root above the whole tree and maps to `<base>.ldif`,
/// whose companion directory is the base itself.
pub fn dn_to_path(base: &str, suffix_ndn: &str, ndn: &str) -> String {
    debug_assert!(ndn.is_empty() || dn::is_suffix(ndn, suffix_ndn));

    if ndn.is_empty() {
        return format!("{base}{LDIF_SUFFIX}");
    }

    let mut components: Vec<String> = Vec::new();
    if !suffix_ndn.is_empty() {
        let mut seg = String::with_capacity(suffix_ndn.len());
        encode_component(&mut seg, suffix_ndn);
        components.push(seg);
    }

    let mut above = &ndn[..ndn.len().saturating_sub(suffix_ndn.len())];
    if !suffix_ndn.is_empty() {
        above = above.strip_suffix(',').unwrap_or(above);
    }
    if !above.is_empty() {
        for rdn in dn::split_unescaped(above, b',').into_iter().rev() {
            let mut seg = String::with_capacity(rdn.len());
            encode_component(&mut seg, rdn);
            components.push(seg);
        }
    }

    let mut path = String::with_capacity(base.len() + ndn.len() + 16);
    path.push_str(base);
    for c in &components {
        path.push(MAIN_SEPARATOR);
        path.push_str(c);
    }
    path.push_str(LDIF_SUFFIX);
    path
}

/// Entry file path -> companion subtree directory path. Byte-length
/// accounting only; never re-encodes.
pub fn entry_to_dir(entry_path: &str) -> &str {
    debug_assert!(entry_path.ends_with(LDIF_SUFFIX));
    &entry_path[..entry_path.len() - LDIF_SUFFIX.len()]
}

/// Companion directory path -> entry file path.
pub fn dir_to_entry(dir_path: &str) -> String {
    format!("{dir_path}{LDIF_SUFFIX}")
}

/// For an entry file path, the containing directory and that
/// directory's own entry file (same stem plus the suffix).
pub fn parent_paths(entry_path: &str) -> (String, String) {
    let dir = match entry_path.rfind(MAIN_SEPARATOR) {
        Some(i) => &entry_path[..i],
        None => "",
    };
    (dir.to_string(), dir_to_entry(dir))
}
