//! Error types for field configuration and development diagnostics.
//!
//! The steady-state read, write and track paths have no error cases; only
//! setting fields up and misusing untracked members can fail.

use std::sync::Arc;

use crate::storage::FieldKey;

/// Configuration errors, raised once when a field accessor is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The field key is empty.
    #[error("field key must not be empty")]
    EmptyKey,

    /// The member is a computed accessor, not a plain data field.
    #[error("cannot track `{key}` on {class}: it is a computed accessor, not a plain data field")]
    NotADataField {
        /// Name of the class the member belongs to.
        class: Arc<str>,
        /// The offending member.
        key: FieldKey,
    },

    /// The member is already tracked.
    #[error("`{key}` on {class} is already tracked")]
    AlreadyTracked {
        /// Name of the class the member belongs to.
        class: Arc<str>,
        /// The offending member.
        key: FieldKey,
    },

    /// A member with the same key is already declared.
    #[error("{class} already declares a member named `{key}`")]
    DuplicateMember {
        /// Name of the class the member belongs to.
        class: Arc<str>,
        /// The offending member.
        key: FieldKey,
    },
}

/// Usage errors found by development diagnostics.
///
/// These point at invalidation bugs in consuming code. With diagnostics
/// disabled the checks producing them are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// An untracked member was written after a tracked computation read it.
    #[error(
        "`{key}` on {object} was read by a tracked computation and then updated, \
         but it is not tracked, so the computation will not be invalidated; \
         make `{key}` a tracked field"
    )]
    MutatedAfterRead {
        /// Display name of the object (label and id).
        object: String,
        /// The untracked member.
        key: FieldKey,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::NotADataField {
            class: "Person".into(),
            key: "fullName".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot track `fullName` on Person: it is a computed accessor, not a plain data field"
        );
        assert_eq!(ConfigError::EmptyKey.to_string(), "field key must not be empty");
    }

    #[test]
    fn test_usage_error_names_object_and_key() {
        let err = UsageError::MutatedAfterRead {
            object: "Person#0".to_string(),
            key: "name".into(),
        };
        let message = err.to_string();
        assert!(message.contains("Person#0"));
        assert!(message.contains("`name`"));
    }
}
