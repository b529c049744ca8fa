//! The backend proper: request types, operation handlers, the
//! reader-writer gate, and lifecycle.
//!
//! Every handler takes the backend-wide lock for the full duration of
//! its filesystem work and releases it before the result goes back to
//! the host, making each handler a linearization point. Writers
//! (add/modify/modrdn/delete) exclude everything; readers run
//! concurrently.
//!
//! modrdn is not crash-atomic: it writes the new entry file, unlinks
//! the old one, then renames the companion directory. A crash between
//! steps can leave both entries or a directory under the old stem;
//! cleanup is the operator's job.
//!
//! [`LdifBackend::new`] allocates all per-instance state including the
//! lock; dropping the instance releases it. [`LdifBackend::open`]
//! validates the configuration.

use std::io::ErrorKind;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use ldifstore_model::{
    dn, hooks, modify, AccessControl, AllowAllAcl, CsnAllocator, Entry, Filter, Modification,
    OpError, OpResult, PasswordCheck, PermissiveSchema, PlaintextPasswords, ResultSink,
    SchemaCheck, Scope, SerialCsn,
};

use crate::codec;
use crate::config::BackendConfig;
use crate::fileio;
use crate::tool::ToolState;
use crate::tree::{self, EnumCookie};

/// The ManageDSAit control: referral entries are served as ordinary
/// entries when a request carries it.
pub const CONTROL_MANAGE_DSA_IT: &str = "2.16.840.1.113730.3.4.2";

/// Capabilities the backend advertises at registration.
#[derive(Debug, Clone, Copy)]
pub struct BackendInfo {
    /// Request controls the backend honors.
    pub controls: &'static [&'static str],
    /// Increment modifications are supported.
    pub supports_increment: bool,
    /// Referral objects are understood and synthesized.
    pub supports_referrals: bool,
    /// Exactly one suffix per database instance.
    pub single_suffix: bool,
}

/// A search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Search base, presentation form.
    pub base_dn: String,
    /// Search base, normalized.
    pub base_ndn: String,
    /// Scope relative to the base.
    pub scope: Scope,
    /// Candidate filter.
    pub filter: Filter,
    /// Attributes to return; empty means all.
    pub attrs: Vec<String>,
    /// ManageDSAit: treat referral entries as ordinary entries.
    pub manage_dsa_it: bool,
}

impl SearchRequest {
    /// Builds a request, deriving the normalized base.
    pub fn new(base_dn: impl Into<String>, scope: Scope, filter: Filter) -> Self {
        let base_dn = base_dn.into();
        let base_ndn = dn::normalize(&base_dn);
        Self {
            base_dn,
            base_ndn,
            scope,
            filter,
            attrs: Vec::new(),
            manage_dsa_it: false,
        }
    }
}

/// A simple (password) bind request.
#[derive(Debug, Clone)]
pub struct BindRequest {
    /// Bind DN, presentation form.
    pub dn: String,
    /// Bind DN, normalized.
    pub ndn: String,
    /// The credential presented.
    pub cred: String,
}

impl BindRequest {
    /// Builds a request, deriving the normalized DN.
    pub fn new(dn: impl Into<String>, cred: impl Into<String>) -> Self {
        let dn = dn.into();
        let ndn = dn::normalize(&dn);
        Self {
            dn,
            ndn,
            cred: cred.into(),
        }
    }
}

/// An add request; the entry carries its own DN.
#[derive(Debug, Clone)]
pub struct AddRequest {
    /// The candidate entry.
    pub entry: Entry,
}

/// A modify request.
#[derive(Debug, Clone)]
pub struct ModifyRequest {
    /// Target DN, presentation form.
    pub dn: String,
    /// Target DN, normalized.
    pub ndn: String,
    /// Modification list, applied in order.
    pub mods: Vec<Modification>,
}

impl ModifyRequest {
    /// Builds a request, deriving the normalized DN.
    pub fn new(dn: impl Into<String>, mods: Vec<Modification>) -> Self {
        let dn = dn.into();
        let ndn = dn::normalize(&dn);
        Self { dn, ndn, mods }
    }
}

/// A modify-RDN (rename) request.
#[derive(Debug, Clone)]
pub struct ModRdnRequest {
    /// Target DN, presentation form.
    pub dn: String,
    /// Target DN, normalized.
    pub ndn: String,
    /// The new leaf RDN, presentation form.
    pub new_rdn: String,
    /// Optional new superior DN; the entry moves below it.
    pub new_superior: Option<String>,
    /// Additional modifications applied with the rename (e.g. the
    /// host's RDN attribute maintenance).
    pub mods: Vec<Modification>,
}

impl ModRdnRequest {
    /// Builds a rename-in-place request.
    pub fn new(dn: impl Into<String>, new_rdn: impl Into<String>) -> Self {
        let dn = dn.into();
        let ndn = dn::normalize(&dn);
        Self {
            dn,
            ndn,
            new_rdn: new_rdn.into(),
            new_superior: None,
            mods: Vec::new(),
        }
    }
}

/// A delete request.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// Target DN, presentation form.
    pub dn: String,
    /// Target DN, normalized.
    pub ndn: String,
    /// Change sequence number; allocated by the handler when absent.
    pub csn: Option<String>,
}

impl DeleteRequest {
    /// Builds a request, deriving the normalized DN.
    pub fn new(dn: impl Into<String>) -> Self {
        let dn = dn.into();
        let ndn = dn::normalize(&dn);
        Self { dn, ndn, csn: None }
    }
}

/// One flat-file backend instance serving a single suffix.
pub struct LdifBackend {
    base: String,
    suffix_dn: String,
    suffix_ndn: String,
    default_referrals: Vec<String>,
    gate: RwLock<()>,
    pub(crate) tool: Mutex<ToolState>,
    schema: Box<dyn SchemaCheck>,
    acl: Box<dyn AccessControl>,
    passwords: Box<dyn PasswordCheck>,
    csn: Box<dyn CsnAllocator>,
}

impl LdifBackend {
    /// Initializes backend state with permissive default hooks.
    pub fn new(config: BackendConfig) -> Self {
        let suffix_ndn = dn::normalize(&config.suffix);
        Self {
            base: config.directory.to_string_lossy().into_owned(),
            suffix_dn: config.suffix,
            suffix_ndn,
            default_referrals: config.default_referrals,
            gate: RwLock::new(()),
            tool: Mutex::new(ToolState::new()),
            schema: Box::new(PermissiveSchema),
            acl: Box::new(AllowAllAcl),
            passwords: Box::new(PlaintextPasswords),
            csn: Box::new(SerialCsn::new()),
        }
    }

    /// Replaces the schema check hook.
    pub fn with_schema_check(mut self, hook: Box<dyn SchemaCheck>) -> Self {
        self.schema = hook;
        self
    }

    /// Replaces the access control hook.
    pub fn with_access_control(mut self, hook: Box<dyn AccessControl>) -> Self {
        self.acl = hook;
        self
    }

    /// Replaces the password check hook.
    pub fn with_password_check(mut self, hook: Box<dyn PasswordCheck>) -> Self {
        self.passwords = hook;
        self
    }

    /// Replaces the CSN allocator.
    pub fn with_csn_allocator(mut self, hook: Box<dyn CsnAllocator>) -> Self {
        self.csn = hook;
        self
    }

    /// Capabilities advertised to the host.
    pub fn info() -> BackendInfo {
        BackendInfo {
            controls: &[CONTROL_MANAGE_DSA_IT],
            supports_increment: true,
            supports_referrals: true,
            single_suffix: true,
        }
    }

    /// Verifies the instance is usable; the base directory must be set.
    pub fn open(&self) -> OpResult<()> {
        if self.base.is_empty() {
            warn!("missing base path for flat-file backend");
            return Err(OpError::UnwillingToPerform(
                "missing base directory".to_string(),
            ));
        }
        Ok(())
    }

    /// The suffix served by this instance, presentation form.
    pub fn suffix(&self) -> &str {
        &self.suffix_dn
    }

    /// The suffix served by this instance, normalized.
    pub fn suffix_ndn(&self) -> &str {
        &self.suffix_ndn
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    /// Entry file path for a normalized DN; the DN must sit under the
    /// suffix or there is no object here.
    pub(crate) fn path_of(&self, ndn: &str) -> OpResult<String> {
        if !dn::is_suffix(ndn, &self.suffix_ndn) {
            return Err(OpError::NoSuchObject);
        }
        Ok(codec::dn_to_path(&self.base, &self.suffix_ndn, ndn))
    }

    /// Loads the entry for a DN pair, returning it with its file path.
    fn get_entry(&self, dn_: &str, ndn: &str) -> OpResult<(Entry, String)> {
        let path = self.path_of(ndn)?;
        let pdn = dn::parent(dn_);
        let pndn = dn::parent(ndn);
        let entry = fileio::read_entry(&path, Some((pdn, pndn)))?;
        Ok((entry, path))
    }

    /// Simple bind: load the entry, require a password attribute, defer
    /// to the password hook. Any retrieval failure is reported as bad
    /// credentials so bind does not leak entry existence.
    pub fn bind(&self, req: &BindRequest) -> OpResult<()> {
        let _gate = self.gate.read();
        let (entry, _) = match self.get_entry(&req.dn, &req.ndn) {
            Ok(found) => found,
            Err(_) => return Err(OpError::InvalidCredentials),
        };
        let stored = match entry.password_values() {
            Some(v) if !v.is_empty() => v.to_vec(),
            _ => return Err(OpError::InappropriateAuth),
        };
        if self.passwords.verify(&entry, &stored, &req.cred) {
            Ok(())
        } else {
            Err(OpError::InvalidCredentials)
        }
    }

    /// Scoped search streaming results into `sink`.
    pub fn search(&self, req: &SearchRequest, sink: &mut dyn ResultSink) -> OpResult<()> {
        if !req.base_ndn.is_empty() && !dn::is_suffix(&req.base_ndn, &self.suffix_ndn) {
            return Err(OpError::NoSuchObject);
        }
        let _gate = self.gate.read();
        let mut ck = EnumCookie {
            req,
            sink: Some(sink),
            entries: Vec::new(),
        };
        tree::enum_tree(&self.base, &self.suffix_dn, &self.suffix_ndn, &mut ck)
    }

    /// Adds a new entry. The parent entry must exist; its subtree
    /// directory is created on demand for the first child.
    pub fn add(&self, req: &mut AddRequest) -> OpResult<()> {
        debug!(dn = req.entry.dn(), "add");
        self.schema.check(&mut req.entry)?;
        hooks::stamp_add_operational(&mut req.entry, self.csn.as_ref());

        let _gate = self.gate.write();
        let path = self.path_of(req.entry.ndn())?;
        self.ensure_parent(&path)?;

        match fileio::entry_file_exists(&path)? {
            true => Err(OpError::AlreadyExists),
            false => fileio::write_entry(&path, &mut req.entry),
        }
    }

    /// Parent lifecycle rule shared by add and tool-mode put: a missing
    /// parent directory is created when the parent entry file exists,
    /// otherwise the add has no parent object.
    pub(crate) fn ensure_parent(&self, entry_path: &str) -> OpResult<()> {
        let (parent_dir, parent_file) = codec::parent_paths(entry_path);
        match std::fs::metadata(&parent_dir) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match std::fs::metadata(&parent_file) {
                    Ok(_) => fileio::make_subtree_dir(&parent_dir).map_err(|e| {
                        warn!(dir = %parent_dir, error = %e, "could not create folder");
                        OpError::UnwillingToPerform("could not create parent folder".to_string())
                    }),
                    Err(e2) if e2.kind() == ErrorKind::NotFound => Err(OpError::NoSuchObject),
                    Err(_) => Err(OpError::UnwillingToPerform(
                        "cannot stat parent entry file".to_string(),
                    )),
                }
            }
            Err(_) => Err(OpError::UnwillingToPerform(
                "cannot stat parent directory".to_string(),
            )),
        }
    }

    /// Applies a modification list under the access and schema hooks,
    /// invalidating the object-class flag cache when the list touches
    /// objectClass.
    fn apply_mods(&self, entry: &mut Entry, mods: &[Modification]) -> OpResult<()> {
        if !self.acl.allow_mods(entry, mods) {
            return Err(OpError::InsufficientAccess);
        }
        let mut touched_oc = false;
        for m in mods {
            if m.touches_object_class() {
                touched_oc = true;
            }
            modify::apply(entry, m)?;
        }
        if touched_oc {
            entry.invalidate_oc_flags();
        }
        self.schema.check(entry)
    }

    /// Modifies an entry in place; the rewrite is atomic.
    pub fn modify(&self, req: &ModifyRequest) -> OpResult<()> {
        let _gate = self.gate.write();
        let (mut entry, path) = self.get_entry(&req.dn, &req.ndn)?;
        self.apply_mods(&mut entry, &req.mods)?;
        hooks::stamp_modify_operational(&mut entry, self.csn.as_ref());
        fileio::write_entry(&path, &mut entry)
    }

    /// Renames an entry, optionally under a new superior, carrying its
    /// whole subtree along via a directory rename.
    pub fn modrdn(&self, req: &ModRdnRequest) -> OpResult<()> {
        let _gate = self.gate.write();
        let (mut entry, old_path) = self.get_entry(&req.dn, &req.ndn)?;

        let parent_dn = match &req.new_superior {
            Some(sup) => {
                let sup_ndn = dn::normalize(sup);
                self.get_entry(sup, &sup_ndn)?;
                sup.clone()
            }
            None => dn::parent(entry.dn()).to_string(),
        };
        let new_dn = dn::build(&req.new_rdn, &parent_dn);
        let new_ndn = dn::normalize(&new_dn);
        entry.set_dn(new_dn, new_ndn);

        self.apply_mods(&mut entry, &req.mods)?;
        hooks::stamp_modify_operational(&mut entry, self.csn.as_ref());
        self.move_entry(&mut entry, &old_path)
    }

    /// Write new file, unlink old file, rename companion directory.
    /// Not crash-atomic across the steps; failures after the first step
    /// surface explicitly and leave the transient state for operator
    /// cleanup.
    fn move_entry(&self, entry: &mut Entry, old_path: &str) -> OpResult<()> {
        let new_path = self.path_of(entry.ndn())?;
        if fileio::entry_file_exists(&new_path)? {
            return Err(OpError::AlreadyExists);
        }
        self.ensure_parent(&new_path)?;
        fileio::write_entry(&new_path, entry)?;

        if let Err(e) = std::fs::remove_file(old_path) {
            warn!(path = old_path, error = %e, "cannot unlink renamed entry");
            return Err(OpError::io("cannot unlink renamed entry file", &e));
        }
        let old_dir = codec::entry_to_dir(old_path);
        let new_dir = codec::entry_to_dir(&new_path);
        match std::fs::rename(old_dir, new_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(from = old_dir, to = new_dir, error = %e, "cannot rename subtree directory");
                Err(OpError::io("cannot rename subtree directory", &e))
            }
        }
    }

    /// Deletes a leaf entry. The companion directory goes first; a
    /// populated one refuses the delete, a missing one means leaf.
    pub fn delete(&self, req: &mut DeleteRequest) -> OpResult<()> {
        if req.csn.is_none() {
            req.csn = Some(self.csn.next());
        }

        let _gate = self.gate.write();
        let path = self.path_of(&req.ndn)?;
        let dir = codec::entry_to_dir(&path);

        match std::fs::remove_dir(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
                return Err(OpError::NotAllowedOnNonLeaf);
            }
            Err(e) => {
                warn!(dir, error = %e, "cannot delete subtree directory");
                return Err(OpError::Other(
                    "internal error (cannot delete subtree directory)".to_string(),
                ));
            }
        }

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OpError::NoSuchObject),
            Err(e) => {
                warn!(path, error = %e, "cannot delete entry file");
                Err(OpError::Other(
                    "internal error (cannot delete entry file)".to_string(),
                ))
            }
        }
    }

    /// Pre-operation referral check. Returns `Ok(())` when the target
    /// (or the tree) is locally authoritative; a referral error when a
    /// referral entry shadows the target, with the shadowing DN as the
    /// matched DN; the default referrals when nothing under the suffix
    /// matches.
    pub fn referral_check(&self, req_dn: &str, req_ndn: &str, manage_dsa_it: bool) -> OpResult<()> {
        if manage_dsa_it || req_ndn.is_empty() {
            return Ok(());
        }

        let _gate = self.gate.read();
        if let Ok((entry, _)) = self.get_entry(req_dn, req_ndn) {
            if entry.is_referral() {
                let urls = entry.referral_urls().unwrap_or(&[]);
                return Err(OpError::Referral {
                    refs: hooks::referral_rewrite(urls, entry.dn()),
                    matched: Some(entry.dn().to_string()),
                });
            }
            return Ok(());
        }

        // Target absent: walk up toward the suffix looking for the
        // nearest existing ancestor.
        let min_len = self.suffix_ndn.len().max(1);
        let mut pndn = req_ndn;
        loop {
            pndn = dn::parent(pndn);
            if pndn.len() < min_len {
                break;
            }
            if let Ok((ancestor, _)) = self.get_entry(pndn, pndn) {
                if ancestor.is_referral() {
                    let urls = ancestor.referral_urls().unwrap_or(&[]);
                    debug!(dn = req_dn, matched = ancestor.dn(), "referral ancestor");
                    return Err(OpError::Referral {
                        refs: hooks::referral_rewrite(urls, ancestor.dn()),
                        matched: Some(ancestor.dn().to_string()),
                    });
                }
                return Ok(());
            }
        }

        if !self.default_referrals.is_empty() {
            return Err(OpError::Referral {
                refs: hooks::referral_rewrite(&self.default_referrals, req_dn),
                matched: None,
            });
        }
        Ok(())
    }

    /// Fetches one entry for in-server use, optionally requiring an
    /// object class.
    pub fn entry_get(&self, ndn: &str, object_class: Option<&str>) -> OpResult<Entry> {
        let _gate = self.gate.read();
        let (entry, _) = self.get_entry(ndn, ndn)?;
        if let Some(oc) = object_class {
            if !entry.has_object_class(oc) {
                return Err(OpError::NoSuchAttribute(oc.to_string()));
            }
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_advertises_manage_dsa_it() {
        let info = LdifBackend::info();
        assert!(info.controls.contains(&CONTROL_MANAGE_DSA_IT));
        assert!(info.supports_increment);
        assert!(info.supports_referrals);
        assert!(info.single_suffix);
    }

    #[test]
    fn test_open_requires_directory() {
        let be = LdifBackend::new(BackendConfig::new("", "dc=example,dc=com"));
        assert!(matches!(
            be.open(),
            Err(OpError::UnwillingToPerform(_))
        ));
        let be = LdifBackend::new(BackendConfig::new("/tmp/db", "dc=example,dc=com"));
        assert!(be.open().is_ok());
    }

    #[test]
    fn test_path_of_rejects_foreign_dns() {
        let be = LdifBackend::new(BackendConfig::new("/tmp/db", "dc=example,dc=com"));
        assert!(matches!(
            be.path_of("dc=elsewhere,dc=net"),
            Err(OpError::NoSuchObject)
        ));
        assert!(be.path_of("cn=x,dc=example,dc=com").is_ok());
    }

    #[test]
    fn test_suffix_is_normalized() {
        let be = LdifBackend::new(BackendConfig::new("/tmp/db", "DC=Example,DC=Com"));
        assert_eq!(be.suffix(), "DC=Example,DC=Com");
        assert_eq!(be.suffix_ndn(), "dc=example,dc=com");
    }
}
