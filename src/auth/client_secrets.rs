use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The client section of a Google OAuth client JSON download.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials {}", path.display()))?;
    parse_client_secrets(&s)
}

pub fn parse_client_secrets(json: &str) -> Result<ClientSecrets> {
    let file: ClientSecretsFile = serde_json::from_str(json)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| anyhow!("credentials file has neither an `installed` nor a `web` client"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_client() {
        let json = r#"{"installed":{"client_id":"abc.apps.googleusercontent.com",
            "client_secret":"xyz","redirect_uris":["http://localhost"]}}"#;
        let secrets = parse_client_secrets(json).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret.as_deref(), Some("xyz"));
        assert_eq!(secrets.redirect_uris, vec!["http://localhost".to_string()]);
    }

    #[test]
    fn web_client_without_secret() {
        let secrets = parse_client_secrets(r#"{"web":{"client_id":"w"}}"#).unwrap();
        assert_eq!(secrets.client_id, "w");
        assert_eq!(secrets.client_secret, None);
    }

    #[test]
    fn unknown_layout_is_rejected() {
        assert!(parse_client_secrets(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, r#"{"installed":{"client_id":"disk"}}"#).unwrap();
        assert_eq!(load_client_secrets(&path).unwrap().client_id, "disk");
    }
}
