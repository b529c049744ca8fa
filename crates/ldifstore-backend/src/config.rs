//! Backend configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ldifstore_model::{OpError, OpResult};

/// Configuration for one flat-file backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base directory holding the suffix entry's file and subtree.
    pub directory: PathBuf,
    /// The suffix DN this backend serves, in presentation form.
    pub suffix: String,
    /// Referral URLs returned when a request target is outside the tree
    /// and no referral ancestor shadows it.
    #[serde(default)]
    pub default_referrals: Vec<String>,
}

impl BackendConfig {
    /// Creates a config for a directory and suffix with no default referrals.
    pub fn new(directory: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            suffix: suffix.into(),
            default_referrals: Vec::new(),
        }
    }

    /// Validates the required fields; called by backend open.
    pub fn validate(&self) -> OpResult<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(OpError::UnwillingToPerform(
                "missing base directory".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_directory() {
        let cfg = BackendConfig::new("", "dc=example,dc=com");
        assert!(cfg.validate().is_err());
        let cfg = BackendConfig::new("/var/lib/dir", "dc=example,dc=com");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let cfg: BackendConfig = serde_json::from_str(
            r#"{"directory": "/tmp/db", "suffix": "dc=example,dc=com"}"#,
        )
        .unwrap();
        assert!(cfg.default_referrals.is_empty());
    }
}
