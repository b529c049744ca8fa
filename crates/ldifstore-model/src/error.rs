//! Result taxonomy for directory operations.

use thiserror::Error;

/// Result type alias for directory operations.
pub type OpResult<T> = Result<T, OpError>;

/// Error variants surfaced by directory operations.
///
/// Success is the `Ok` side of [`OpResult`]; everything a handler can
/// report to the host's result sink is a variant here.
#[derive(Debug, Error)]
pub enum OpError {
    /// A required entry (or its file) does not exist.
    #[error("no such object")]
    NoSuchObject,

    /// The target entry already exists.
    #[error("entry already exists")]
    AlreadyExists,

    /// Deletion refused because the entry still has children.
    #[error("operation not allowed on non-leaf entry")]
    NotAllowedOnNonLeaf,

    /// Bind failed: unknown entry or wrong credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Bind failed: the entry cannot be authenticated against.
    #[error("inappropriate authentication")]
    InappropriateAuth,

    /// Access control denied the modification.
    #[error("insufficient access")]
    InsufficientAccess,

    /// The backend refuses the operation; carries an operator-facing reason.
    #[error("unwilling to perform: {0}")]
    UnwillingToPerform(String),

    /// Transient failure opening a subtree directory.
    #[error("busy")]
    Busy,

    /// A named attribute (or required object class) is absent.
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    /// A value being added is already present.
    #[error("attribute or value exists: {0}")]
    TypeOrValueExists(String),

    /// A value does not conform to the attribute's syntax.
    #[error("invalid attribute syntax: {0}")]
    InvalidSyntax(String),

    /// The operation resolved to a referral instead of a local entry.
    #[error("referral ({} targets)", refs.len())]
    Referral {
        /// Referral target URLs, already rewritten for the request.
        refs: Vec<String>,
        /// DN of the referral entry that shadowed the request target.
        matched: Option<String>,
    },

    /// Any unexpected failure; carries a human-readable message.
    #[error("{0}")]
    Other(String),
}

impl OpError {
    /// The standard LDAP result code for this error.
    pub fn code(&self) -> u32 {
        match self {
            OpError::Referral { .. } => 10,
            OpError::NoSuchAttribute(_) => 16,
            OpError::TypeOrValueExists(_) => 20,
            OpError::InvalidSyntax(_) => 21,
            OpError::NoSuchObject => 32,
            OpError::InappropriateAuth => 48,
            OpError::InvalidCredentials => 49,
            OpError::InsufficientAccess => 50,
            OpError::Busy => 51,
            OpError::UnwillingToPerform(_) => 53,
            OpError::NotAllowedOnNonLeaf => 66,
            OpError::AlreadyExists => 68,
            OpError::Other(_) => 80,
        }
    }

    /// Wraps an I/O failure with the path it occurred on.
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        OpError::Other(format!("{context}: {err}"))
    }
}
