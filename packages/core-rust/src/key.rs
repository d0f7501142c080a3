//! Config keys and the identifier grammar for definition names.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Definition names start with a letter and continue with letters, digits,
/// dashes or underscores.
static DEF_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("name pattern is valid"));

/// Namespaces additionally allow dots as segment separators.
static NAMESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.-]*$").expect("namespace pattern is valid"));

/// Identifies one watchable configuration resource.
///
/// A key is the triple of definition name, definition namespace and the
/// config id of the instance being addressed. The empty config id addresses
/// the application's default instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigKey {
    /// Definition name, e.g. `query-profiles`.
    pub name: String,
    /// Definition namespace, e.g. `search.config`.
    pub namespace: String,
    /// Instance id, e.g. `search/cluster.music/qrserver.0`.
    pub config_id: String,
}

impl ConfigKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            config_id: config_id.into(),
        }
    }

    /// True when `name` matches the definition-name grammar.
    #[must_use]
    pub fn is_valid_name(name: &str) -> bool {
        DEF_NAME_PATTERN.is_match(name)
    }

    /// True when `namespace` matches the namespace grammar.
    #[must_use]
    pub fn is_valid_namespace(namespace: &str) -> bool {
        NAMESPACE_PATTERN.is_match(namespace)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.namespace, self.name, self.config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(ConfigKey::is_valid_name("search"));
        assert!(ConfigKey::is_valid_name("query-profiles"));
        assert!(ConfigKey::is_valid_name("a1_b2-c3"));
    }

    #[test]
    fn invalid_names() {
        assert!(!ConfigKey::is_valid_name(""));
        assert!(!ConfigKey::is_valid_name("1search"));
        assert!(!ConfigKey::is_valid_name("-search"));
        assert!(!ConfigKey::is_valid_name("search.sub"));
        assert!(!ConfigKey::is_valid_name("search config"));
    }

    #[test]
    fn valid_namespaces() {
        assert!(ConfigKey::is_valid_namespace("config"));
        assert!(ConfigKey::is_valid_namespace("search.config"));
        assert!(ConfigKey::is_valid_namespace("a.b-c.d_e"));
    }

    #[test]
    fn invalid_namespaces() {
        assert!(!ConfigKey::is_valid_namespace(""));
        assert!(!ConfigKey::is_valid_namespace(".config"));
        assert!(!ConfigKey::is_valid_namespace("9config"));
        assert!(!ConfigKey::is_valid_namespace("con fig"));
    }

    #[test]
    fn key_equality_is_by_value() {
        let a = ConfigKey::new("search", "config", "clusters/music");
        let b = ConfigKey::new("search", "config", "clusters/music");
        let c = ConfigKey::new("search", "config", "clusters/books");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_display_is_compact() {
        let key = ConfigKey::new("search", "config", "clusters/music");
        assert_eq!(key.to_string(), "config.search:clusters/music");
    }

    #[test]
    fn key_serde_uses_camel_case() {
        let key = ConfigKey::new("search", "config", "id0");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["configId"], "id0");
    }
}
