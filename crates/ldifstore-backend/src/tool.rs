//! Batch (tool) mode for offline import and export.
//!
//! Bypasses the reader-writer gate and the result sink: export iterates
//! a buffer filled by one subtree enumeration rooted at the suffix,
//! import reuses the add path-and-file logic without schema or access
//! checks (the import pipeline owns those).

use tracing::debug;

use ldifstore_model::{Entry, Filter, OpResult, Scope};

use crate::backend::{LdifBackend, SearchRequest};
use crate::fileio;
use crate::tree::{self, EnumCookie};

/// Initial capacity of the export buffer; growth doubles from here.
const ENTRY_BUFF_INCREMENT: usize = 500;

/// 1-based handle into the tool-mode buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub u64);

pub(crate) struct ToolState {
    entries: Option<Vec<Option<Entry>>>,
    current: u64,
    puts: u64,
}

impl ToolState {
    pub(crate) fn new() -> Self {
        Self {
            entries: None,
            current: 0,
            puts: 0,
        }
    }
}

impl LdifBackend {
    /// Starts a tool-mode session, rewinding the export cursor.
    pub fn tool_entry_open(&self) -> OpResult<()> {
        let mut tool = self.tool.lock();
        tool.current = 0;
        Ok(())
    }

    /// Ends a tool-mode session, dropping the export buffer.
    pub fn tool_entry_close(&self) -> OpResult<()> {
        let mut tool = self.tool.lock();
        tool.entries = None;
        tool.current = 0;
        Ok(())
    }

    /// First entry of the export traversal. Fills the buffer lazily
    /// with one subtree enumeration rooted at the suffix.
    pub fn tool_entry_first(&self) -> Option<EntryId> {
        {
            let mut tool = self.tool.lock();
            if tool.entries.is_none() {
                let req = SearchRequest {
                    base_dn: self.suffix().to_string(),
                    base_ndn: self.suffix_ndn().to_string(),
                    scope: Scope::Subtree,
                    filter: Filter::match_all(),
                    attrs: Vec::new(),
                    manage_dsa_it: true,
                };
                let mut ck = EnumCookie {
                    req: &req,
                    sink: None,
                    entries: Vec::with_capacity(ENTRY_BUFF_INCREMENT),
                };
                // A missing or empty tree exports nothing.
                let _ = tree::enum_tree(self.base(), self.suffix(), self.suffix_ndn(), &mut ck);
                debug!(count = ck.entries.len(), "filled tool export buffer");
                tool.entries = Some(ck.entries.into_iter().map(Some).collect());
            }
        }
        self.tool_entry_next()
    }

    /// Advances the export cursor; `None` past the last entry.
    pub fn tool_entry_next(&self) -> Option<EntryId> {
        let mut tool = self.tool.lock();
        let count = tool.entries.as_ref().map(|e| e.len()).unwrap_or(0) as u64;
        if tool.current >= count {
            None
        } else {
            tool.current += 1;
            Some(EntryId(tool.current))
        }
    }

    /// Takes the entry for an id out of the buffer, transferring
    /// ownership to the caller; the slot is emptied.
    pub fn tool_entry_get(&self, id: EntryId) -> Option<Entry> {
        let mut tool = self.tool.lock();
        let entries = tool.entries.as_mut()?;
        if id.0 < 1 || id.0 as usize > entries.len() {
            return None;
        }
        entries[id.0 as usize - 1].take()
    }

    /// Imports one entry: same parent and file rules as add, no schema
    /// or access checks, no locking.
    pub fn tool_entry_put(&self, entry: &mut Entry) -> OpResult<EntryId> {
        let path = self.path_of(entry.ndn())?;
        self.ensure_parent(&path)?;
        match fileio::entry_file_exists(&path)? {
            true => Err(ldifstore_model::OpError::AlreadyExists),
            false => {
                fileio::write_entry(&path, entry)?;
                let mut tool = self.tool.lock();
                tool.puts += 1;
                Ok(EntryId(tool.puts))
            }
        }
    }
}
