use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Cached access token, its expiry (epoch seconds) and the scopes it was
/// granted for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokensFile {
    pub access_token: Option<String>,
    pub expires_at_epoch: Option<i64>,
    /// Empty for caches written before scopes were recorded.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokensFile {
    /// Whether the grant behind this cache includes every scope in `wanted`.
    pub fn covers(&self, wanted: &[&str]) -> bool {
        wanted.iter().all(|w| self.scopes.iter().any(|s| s == w))
    }

    /// The cached token, if it is still valid at `now` and was granted for
    /// every scope in `wanted`.
    pub fn valid_token(&self, now: i64, wanted: &[&str]) -> Option<&str> {
        if !self.covers(wanted) {
            return None;
        }
        match (&self.access_token, self.expires_at_epoch) {
            (Some(at), Some(exp)) if now < exp => Some(at),
            _ => None,
        }
    }
}

pub fn save_tokens(
    path: &Path,
    access_token: Option<&str>,
    expires_at_epoch: Option<i64>,
    scopes: &[String],
) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tf = TokensFile {
        access_token: access_token.map(|s| s.to_string()),
        expires_at_epoch,
        scopes: scopes.to_vec(),
    };
    let s = serde_json::to_string_pretty(&tf)?;
    fs::write(path, s).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load the token cache if present.
pub fn load_tokens(path: &Path) -> Result<Option<TokensFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)?;
    let tf: TokensFile = serde_json::from_str(&s)
        .with_context(|| format!("corrupt token cache {}", path.display()))?;
    Ok(Some(tf))
}
