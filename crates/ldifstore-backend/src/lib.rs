//! A flat-file directory backend: every entry lives in its own LDIF
//! text file under a directory tree that mirrors the entry tree. An
//! entry's children sit in a companion directory next to its file,
//! sharing the stem. Writes are atomic per entry file (same-directory
//! temp plus rename), a single reader-writer lock serializes writers
//! against readers, and tree enumeration drives scoped search.
//!
//! Best suited to small editable databases: configuration trees,
//! test fixtures, import/export staging.

pub mod backend;
pub mod codec;
pub mod config;
pub mod fileio;
pub mod tool;
mod tree;

pub use backend::{
    AddRequest, BackendInfo, BindRequest, DeleteRequest, LdifBackend, ModRdnRequest,
    ModifyRequest, SearchRequest, CONTROL_MANAGE_DSA_IT,
};
pub use config::BackendConfig;
pub use tool::EntryId;
