#![warn(missing_docs)]

//! Directory data model shared by the ldifstore backend and its host:
//! distinguished names, entries, the LDIF text format, modification
//! primitives, search filters, and the hook traits a host binds at
//! backend registration time.

pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod ldif;
pub mod modify;

pub use entry::{Attribute, Entry};
pub use error::{OpError, OpResult};
pub use filter::Filter;
pub use hooks::{
    AccessControl, AllowAllAcl, CollectingSink, CsnAllocator, PasswordCheck, PermissiveSchema,
    PlaintextPasswords, ResultSink, SchemaCheck, SerialCsn,
};
pub use modify::{ModOp, Modification};

use serde::{Deserialize, Serialize};

/// Search scope relative to a base entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The base entry only.
    Base,
    /// Immediate children of the base, excluding the base itself.
    OneLevel,
    /// The base entry and all of its descendants.
    Subtree,
    /// All descendants of the base, excluding the base itself.
    Subordinate,
}
