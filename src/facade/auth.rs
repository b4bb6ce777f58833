//! Placeholder credential mapping

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Placeholder credential to real credential
///
/// Clients only ever see placeholders; the facade swaps in the real value on
/// the way upstream.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationMapping {
    entries: HashMap<String, String>,
}

impl AuthorizationMapping {
    /// Real credential for `placeholder`
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.entries.get(placeholder).map(String::as_str)
    }

    /// Number of mapped placeholders
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no placeholder is mapped
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite an `Authorization` header value
    ///
    /// The value is `[scheme ]credential`. The credential is looked up and
    /// replaced, keeping the scheme prefix. Returns `None` when the
    /// credential is not mapped.
    pub fn substitute_header(&self, value: &str) -> Option<String> {
        let value = value.trim();

        match value.split_once(char::is_whitespace) {
            Some((scheme, credential)) if !credential.trim().is_empty() => self
                .get(credential.trim())
                .map(|real| format!("{} {}", scheme, real)),
            _ => self.get(value).map(str::to_string),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthorizationMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AuthorizationMapping {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<HashMap<String, String>> for AuthorizationMapping {
    fn from(entries: HashMap<String, String>) -> Self {
        AuthorizationMapping { entries }
    }
}

impl fmt::Debug for AuthorizationMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationMapping")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> AuthorizationMapping {
        [("placeholder", "real-secret"), ("bare", "bare-secret")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_substitute_with_scheme() {
        let auth = mapping();
        assert_eq!(
            auth.substitute_header("Bot placeholder").as_deref(),
            Some("Bot real-secret")
        );
        assert_eq!(
            auth.substitute_header("Bearer   placeholder").as_deref(),
            Some("Bearer real-secret")
        );
    }

    #[test]
    fn test_substitute_bare_credential() {
        assert_eq!(
            mapping().substitute_header("bare").as_deref(),
            Some("bare-secret")
        );
    }

    #[test]
    fn test_substitute_unknown() {
        let auth = mapping();
        assert!(auth.substitute_header("Bot nope").is_none());
        assert!(auth.substitute_header("nope").is_none());
        assert!(auth.substitute_header("").is_none());
        // The scheme alone is never treated as a credential
        assert!(auth.substitute_header("Bot real-secret").is_none());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let debug = format!("{:?}", mapping());
        assert!(!debug.contains("real-secret"));
        assert!(!debug.contains("placeholder"));
        assert!(debug.contains('2'));
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        let auth: AuthorizationMapping = toml::from_str(
            r#"
            "abc" = "def"
            "ghi" = "jkl"
            "#,
        )
        .unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(auth.get("abc"), Some("def"));
        assert_eq!(auth.get("def"), None);
    }
}
