//! Shared fixtures for backend integration tests.

use tempfile::TempDir;

use ldifstore_backend::{AddRequest, BackendConfig, LdifBackend};
use ldifstore_model::Entry;

/// A backend over a throwaway directory tree. The tempdir is dropped
/// (and the tree deleted) with the fixture.
pub struct TestTree {
    _dir: TempDir,
    pub backend: LdifBackend,
    pub base: String,
}

pub const SUFFIX: &str = "dc=example,dc=com";

impl TestTree {
    /// Creates an opened backend with an empty tree.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().to_string_lossy().into_owned();
        let backend = LdifBackend::new(BackendConfig::new(dir.path(), SUFFIX));
        backend.open().expect("open");
        Self {
            _dir: dir,
            backend,
            base,
        }
    }

    /// Creates a backend with the suffix entry already added.
    pub fn with_root() -> Self {
        let tree = Self::new();
        tree.add(entry(SUFFIX, &[("objectClass", &["domain"]), ("dc", &["example"])]));
        tree
    }

    /// Adds an entry, panicking on failure.
    pub fn add(&self, e: Entry) {
        let mut req = AddRequest { entry: e };
        self.backend.add(&mut req).expect("add");
    }

    /// The on-disk path of an entry file relative to the base.
    pub fn disk_path(&self, rel: &str) -> String {
        format!("{}/{}", self.base, rel)
    }
}

/// Builds an entry from (attr, values) pairs.
pub fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> Entry {
    let mut e = Entry::new(dn);
    for (name, values) in attrs {
        e.put_attr(name, values.iter().map(|v| v.to_string()).collect());
    }
    e
}

/// A person entry with a password.
pub fn person(dn: &str, cn: &str, password: Option<&str>) -> Entry {
    let mut e = entry(
        dn,
        &[("objectClass", &["person"]), ("cn", &[cn]), ("sn", &["Test"])],
    );
    if let Some(pw) = password {
        e.put_attr("userPassword", vec![pw.to_string()]);
    }
    e
}
