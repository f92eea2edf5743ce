//! Secret string wrapper that redacts credentials in logs and reports.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A string wrapper that redacts its contents in Debug, Display, and Serialize.
///
/// Agent tokens and generated passwords travel through the fleet wrapped in
/// this type. The actual value is only accessible via `expose_secret()`.
///
/// # Example
///
/// ```
/// use telemetry::SecretString;
///
/// let token = SecretString::new("gitea-token-123".to_string());
///
/// assert_eq!(format!("{:?}", token), "[REDACTED]");
/// assert_eq!(format!("{}", token), "[REDACTED]");
/// assert_eq!(token.expose_secret(), "gitea-token-123");
/// ```
#[derive(Clone)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Create a new SecretString.
    pub fn new(secret: String) -> Self {
        Self { inner: secret }
    }

    /// Wrap a value, treating blank strings as absent.
    ///
    /// Command-line and environment inputs use the empty string for "unset".
    pub fn non_empty(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            None
        } else {
            Some(Self::new(secret))
        }
    }

    /// Expose the secret value.
    ///
    /// Never log the result of this method.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Consume self and return the inner secret.
    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_everywhere() {
        let secret = SecretString::new("leantime-token".to_string());
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[REDACTED]\"");
    }

    #[test]
    fn test_deserialize_keeps_value() {
        let secret: SecretString = serde_json::from_str("\"sk-abc\"").unwrap();
        assert_eq!(secret.expose_secret(), "sk-abc");
        assert_eq!(secret.into_inner(), "sk-abc");
    }

    #[test]
    fn test_non_empty() {
        assert!(SecretString::non_empty("").is_none());
        assert!(SecretString::non_empty("   ").is_none());
        assert_eq!(
            SecretString::non_empty("tok").map(|s| s.into_inner()),
            Some("tok".to_string())
        );
    }

    #[test]
    fn test_equality() {
        let s1: SecretString = "secret".into();
        let s2: SecretString = String::from("secret").into();
        let s3: SecretString = "different".into();

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
    }
}
