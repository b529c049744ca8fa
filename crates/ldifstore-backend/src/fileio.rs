//! Entry file I/O.
//!
//! Reads are bounded by the file's size at open time and detect a file
//! that grew mid-read. Writes go to a uniquely named temporary in the
//! same directory and land via rename-replace, so readers only ever see
//! complete entry images. Serialization runs under a process-wide mutex
//! with the entry's DN shortened to its leaf RDN, which is the only DN
//! form stored on disk.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, warn};

use ldifstore_model::{dn, ldif, Entry, OpError, OpResult};

use crate::codec::LDIF_SUFFIX;

/// Guards the entry serializer, which may rely on shared buffers in a
/// host implementation.
static ENTRY_SERIALIZER: Mutex<()> = Mutex::new(());

/// Reads a complete entry file image. The read is capped one byte past
/// the size observed at open time; seeing that extra byte means the
/// file grew underneath us and the image cannot be trusted.
pub fn read_entry_file(path: &str) -> OpResult<Vec<u8>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path, "no entry file");
            return Err(OpError::NoSuchObject);
        }
        Err(e) => {
            warn!(path, error = %e, "cannot open entry file");
            return Err(OpError::io("cannot open entry file", &e));
        }
    };

    let size = file
        .metadata()
        .map_err(|e| OpError::io("cannot stat entry file", &e))?
        .len();
    let mut data = Vec::with_capacity(size as usize + 1);
    let read = (&mut file)
        .take(size + 1)
        .read_to_end(&mut data)
        .map_err(|e| OpError::io("cannot read entry file", &e))?;
    if read as u64 > size {
        warn!(path, "entry file grew during read");
        return Err(OpError::Other(format!(
            "bad stat() size for \"{path}\""
        )));
    }
    debug!(path, bytes = read, "read entry file");
    Ok(data)
}

/// Stat-only existence check, no read.
pub fn entry_file_exists(path: &str) -> OpResult<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OpError::io("cannot stat entry file", &e)),
    }
}

/// Reads and parses the entry at `path`. The stored DN is the leaf RDN;
/// when a parent DN pair is given, the full DN is rebuilt by appending
/// it to the stored RDN.
pub fn read_entry(path: &str, parent: Option<(&str, &str)>) -> OpResult<Entry> {
    let data = read_entry_file(path)?;
    let text = std::str::from_utf8(&data)
        .map_err(|_| OpError::Other(format!("entry file \"{path}\" is not utf-8")))?;
    let mut entry = ldif::entry_from_ldif(text).map_err(|e| {
        warn!(path, error = %e, "cannot parse entry file");
        OpError::Other("cannot parse some entry file".to_string())
    })?;

    if let Some((pdn, pndn)) = parent {
        if !pdn.is_empty() {
            let rdn = entry.dn().to_string();
            let nrdn = dn::normalize(&rdn);
            entry.set_dn(dn::build(&rdn, pdn), dn::build(&nrdn, pndn));
        }
    }
    Ok(entry)
}

/// Atomically writes `entry` to `path` via a same-directory temporary.
/// A missing parent directory surfaces as `NoSuchObject`. The entry's
/// DN is restored to its full form on every path out.
pub fn write_entry(path: &str, entry: &mut Entry) -> OpResult<()> {
    let p = Path::new(path);
    let dir = p
        .parent()
        .ok_or_else(|| OpError::Other(format!("entry path \"{path}\" has no directory")))?;
    let stem = p
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(LDIF_SUFFIX).unwrap_or(n))
        .unwrap_or("entry");

    let tmp = match tempfile::Builder::new()
        .prefix(&format!("{stem}."))
        .tempfile_in(dir)
    {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(OpError::NoSuchObject),
        Err(e) => {
            warn!(path, error = %e, "cannot create temp entry file");
            return Err(OpError::io("cannot create temp entry file", &e));
        }
    };

    // Only the RDN goes onto disk; restore the full DN whether or not
    // serialization and the write succeed.
    let full_dn = entry.dn().to_string();
    let full_ndn = entry.ndn().to_string();
    let leaf = dn::rdn(&full_dn).to_string();
    let nleaf = dn::normalize(&leaf);
    entry.set_dn(leaf, nleaf);
    let text = {
        let _serializer = ENTRY_SERIALIZER.lock();
        ldif::entry_to_ldif(entry)
    };
    entry.set_dn(full_dn, full_ndn);

    let mut file = tmp.as_file();
    if let Err(e) = file.write_all(text.as_bytes()).and_then(|()| file.sync_all()) {
        warn!(path, error = %e, "write error to temp entry file");
        return Err(OpError::Other(
            "internal error (write error to entry file)".to_string(),
        ));
    }

    match tmp.persist(p) {
        Ok(_) => {
            debug!(dn = entry.dn(), path, "wrote entry");
            Ok(())
        }
        Err(e) if e.error.kind() == ErrorKind::NotFound => Err(OpError::NoSuchObject),
        Err(e) => {
            warn!(path, error = %e.error, "could not put entry file in place");
            Err(OpError::io("could not put entry file in place", &e.error))
        }
    }
}

/// Creates a subtree directory with the backend's permissions.
pub fn make_subtree_dir(path: &str) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new().mode(0o750).create(path)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldifstore_model::Attribute;

    fn entry(dn: &str) -> Entry {
        let mut e = Entry::new(dn);
        e.put_attr("objectClass", vec!["organizationalUnit".into()]);
        e
    }

    #[test]
    fn test_read_missing_file_is_no_such_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/missing.ldif", dir.path().display());
        assert!(matches!(
            read_entry_file(&path),
            Err(OpError::NoSuchObject)
        ));
        assert_eq!(entry_file_exists(&path).unwrap(), false);
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/ou=people.ldif", dir.path().display());
        let mut e = entry("ou=People,dc=example,dc=com");
        write_entry(&path, &mut e).unwrap();

        // the full DN is restored on the in-memory entry
        assert_eq!(e.dn(), "ou=People,dc=example,dc=com");
        assert!(entry_file_exists(&path).unwrap());

        // on disk only the RDN is stored
        let raw = read_entry_file(&path).unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("dn: ou=People\n"), "got: {text}");

        // a parented read rebuilds the full DN
        let back = read_entry(&path, Some(("dc=example,dc=com", "dc=example,dc=com"))).unwrap();
        assert_eq!(back.dn(), "ou=People,dc=example,dc=com");
        assert_eq!(back.ndn(), "ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/cn=x.ldif", dir.path().display());
        let mut e = entry("cn=x,dc=example,dc=com");
        write_entry(&path, &mut e).unwrap();

        e.put_attr("description", vec!["second version".into()]);
        write_entry(&path, &mut e).unwrap();

        let back = read_entry(&path, None).unwrap();
        assert_eq!(
            back.attr("description").unwrap().values,
            vec!["second version"]
        );
    }

    #[test]
    fn test_write_into_missing_dir_is_no_such_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/no-such-dir/cn=x.ldif", dir.path().display());
        let mut e = entry("cn=x,dc=example,dc=com");
        assert!(matches!(
            write_entry(&path, &mut e),
            Err(OpError::NoSuchObject)
        ));
        // full DN restored even on failure
        assert_eq!(e.dn(), "cn=x,dc=example,dc=com");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/cn=x.ldif", dir.path().display());
        let mut e = entry("cn=x,dc=example,dc=com");
        write_entry(&path, &mut e).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|d| d.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cn=x.ldif".to_string()]);
    }

    #[test]
    fn test_read_entry_preserves_attribute_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/cn=x.ldif", dir.path().display());
        let mut e = Entry::new("cn=x");
        for a in ["objectClass", "cn", "sn", "mail"] {
            e.put_attr(a, vec!["v".into()]);
        }
        write_entry(&path, &mut e).unwrap();
        let back = read_entry(&path, None).unwrap();
        let names: Vec<&str> = back.attrs().iter().map(|a: &Attribute| a.name.as_str()).collect();
        assert_eq!(names, vec!["objectClass", "cn", "sn", "mail"]);
    }
}
