//! Host-side opencode credentials

use crate::error::FleetResult;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use telemetry::SecretString;

/// File inside the auth directory that holds provider tokens
pub const AUTH_FILE: &str = "auth.json";

#[derive(Debug, Deserialize)]
struct AuthFile {
    openai: Option<ProviderAuth>,
}

#[derive(Debug, Deserialize)]
struct ProviderAuth {
    access: Option<SecretString>,
}

/// Path of the auth file under `auth_dir`
pub fn auth_file(auth_dir: &Path) -> PathBuf {
    auth_dir.join(AUTH_FILE)
}

/// Read the OpenAI access token from `<auth_dir>/auth.json`.
///
/// A missing file or a file without the token yields `Ok(None)`.
pub async fn read_openai_token(auth_dir: &Path) -> FleetResult<Option<SecretString>> {
    let path = auth_file(auth_dir);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let auth: AuthFile = serde_json::from_str(&content)?;
    Ok(auth
        .openai
        .and_then(|provider| provider.access)
        .and_then(|token| SecretString::non_empty(token.into_inner())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_openai_access_token() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            auth_file(dir.path()),
            r#"{"openai": {"type": "oauth", "access": "tok-123", "refresh": "r"}}"#,
        )
        .unwrap();

        let token = read_openai_token(dir.path()).await.unwrap();
        assert_eq!(token.map(SecretString::into_inner), Some("tok-123".to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_or_token() {
        let dir = TempDir::new().unwrap();
        assert!(read_openai_token(dir.path()).await.unwrap().is_none());

        std::fs::write(auth_file(dir.path()), r#"{"anthropic": {"access": "x"}}"#).unwrap();
        assert!(read_openai_token(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(auth_file(dir.path()), "not json").unwrap();
        assert!(read_openai_token(dir.path()).await.is_err());
    }
}
