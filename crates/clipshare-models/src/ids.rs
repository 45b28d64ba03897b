//! Typed identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a processing job row.
    JobId
);

string_id!(
    /// Unique identifier for a workspace.
    WorkspaceId
);

string_id!(
    /// Unique identifier for a bookmark.
    BookmarkId
);

string_id!(
    /// Unique identifier for a video row.
    VideoId
);

/// Check that an id is safe to use as a single path segment.
///
/// Allowed: ASCII alphanumerics, `-` and `_`, 1 to 128 characters.
pub fn is_safe_path_segment(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = WorkspaceId::from("ws-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ws-1\"");
    }

    #[test]
    fn test_safe_path_segment() {
        assert!(is_safe_path_segment("ws_123-abc"));
        assert!(is_safe_path_segment(&Uuid::new_v4().to_string()));
        assert!(!is_safe_path_segment(""));
        assert!(!is_safe_path_segment("../etc"));
        assert!(!is_safe_path_segment("a/b"));
        assert!(!is_safe_path_segment("has space"));
        assert!(!is_safe_path_segment(&"a".repeat(129)));
    }
}
