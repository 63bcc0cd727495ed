use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Query;

pub const APP_DIR: &str = "anapay_ledger";
const TEMPLATE_HEADER: &str = "\
# anapay_ledger configuration.
#
# client_id / credentials_path: OAuth client used to read Gmail. A
#   credentials_path pointing at Google's client JSON wins over client_id.
# user_email: keyring account the refresh token is stored under.
# spreadsheet_id: target spreadsheet; rows go to its first worksheet.
# service_account_key: optional service-account JSON used for the sheet.
# token_path: access-token cache (defaults next to this file).
# [query]: sender, subject and an inclusive after/before date window.
#
# SPREADSHEET_ID, GCP_CREDENTIALS_PATH, GCP_TOKEN_PATH,
# GCP_SERVICE_ACCOUNT_KEY and OAUTH_CLIENT_SECRET override these values.

";

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/callback";

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// OAuth client id; ignored when `credentials_path` is set.
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Account name the refresh token is stored under in the keyring.
    pub user_email: Option<String>,
    pub spreadsheet_id: Option<String>,
    /// Google "installed app" client JSON.
    pub credentials_path: Option<String>,
    /// Access-token cache file.
    pub token_path: Option<String>,
    /// Service-account JSON key used for the spreadsheet.
    pub service_account_key: Option<String>,
    /// OAuth client secret, only ever taken from the environment.
    #[serde(skip)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub query: Query,
}

impl Config {
    fn template() -> Self {
        Self {
            client_id: Some("YOUR_CLIENT_ID.apps.googleusercontent.com".to_string()),
            redirect_uri: Some(DEFAULT_REDIRECT_URI.to_string()),
            user_email: Some("you@example.com".to_string()),
            spreadsheet_id: Some("YOUR_SPREADSHEET_ID".to_string()),
            credentials_path: None,
            token_path: None,
            service_account_key: None,
            client_secret: None,
            query: Query::default(),
        }
    }

    /// Enough to run: a spreadsheet and an OAuth client to sign in with.
    pub fn is_complete(&self) -> bool {
        let has_sheet = self.spreadsheet_id.as_deref().is_some_and(|s| !s.is_empty());
        has_sheet && (self.credentials_path.is_some() || self.client_id.is_some())
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn spreadsheet_id(&self) -> Result<&str> {
        self.spreadsheet_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("spreadsheet_id not set in config or SPREADSHEET_ID"))
    }

    /// Overlay values from the environment (`lookup` is `std::env::var` in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SPREADSHEET_ID") {
            self.spreadsheet_id = Some(v);
        }
        if let Some(v) = lookup("GCP_CREDENTIALS_PATH") {
            self.credentials_path = Some(v);
        }
        if let Some(v) = lookup("GCP_TOKEN_PATH") {
            self.token_path = Some(v);
        }
        if let Some(v) = lookup("GCP_SERVICE_ACCOUNT_KEY") {
            self.service_account_key = Some(v);
        }
        if let Some(v) = lookup("OAUTH_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_token_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("tokens.json");
    Ok(p)
}

pub fn resolve_token_path(cfg: &Config) -> Result<PathBuf> {
    match &cfg.token_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => default_token_path(),
    }
}

/// Load the config from its default location and apply environment
/// overrides.
pub fn load_config() -> Result<Config> {
    load_config_with(&config_path()?, |key| std::env::var(key).ok())
}

/// Read `path` when it exists, then overlay `lookup`. Without a file the
/// environment alone may configure the run; when it doesn't, a template is
/// written to `path` and an error returned.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let from_file = path.exists();
    let mut cfg = if from_file {
        let s = fs::read_to_string(path)?;
        toml::from_str(&s)?
    } else {
        Config::default()
    };
    cfg.apply_env(lookup);

    if !from_file && !cfg.is_complete() {
        let tom = format!("{TEMPLATE_HEADER}{}", toml::to_string_pretty(&Config::template())?);
        fs::write(path, tom)?;
        return Err(anyhow!(
            "Created template config at {}; edit it (or set SPREADSHEET_ID and \
             GCP_CREDENTIALS_PATH) and run again",
            path.display()
        ));
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = load_config_with(&path, no_env).unwrap_err();
        assert!(err.to_string().contains("Created template config"));

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# anapay_ledger configuration."));

        let cfg = load_config_with(&path, no_env).unwrap();
        assert_eq!(cfg, Config::template());
    }

    #[test]
    fn environment_alone_configures_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let env: HashMap<&str, &str> = HashMap::from([
            ("SPREADSHEET_ID", "sheet-from-env"),
            ("GCP_CREDENTIALS_PATH", "/etc/anapay/credentials.json"),
            ("GCP_SERVICE_ACCOUNT_KEY", "/etc/anapay/sa.json"),
        ]);

        let cfg = load_config_with(&path, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert!(!path.exists());
        assert_eq!(cfg.spreadsheet_id().unwrap(), "sheet-from-env");
        assert_eq!(
            cfg.credentials_path.as_deref(),
            Some("/etc/anapay/credentials.json")
        );
        assert_eq!(cfg.service_account_key.as_deref(), Some("/etc/anapay/sa.json"));
        assert_eq!(cfg.query, Query::default());
        assert_eq!(cfg.redirect_uri(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn partial_environment_still_needs_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let env: HashMap<&str, &str> = HashMap::from([("SPREADSHEET_ID", "sheet-from-env")]);

        let err = load_config_with(&path, |k| env.get(k).map(|v| v.to_string())).unwrap_err();

        assert!(err.to_string().contains("Created template config"));
        assert!(path.exists());
    }

    #[test]
    fn query_defaults_when_table_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "spreadsheet_id = \"abc\"\n").unwrap();

        let cfg = load_config_with(&path, no_env).unwrap();
        assert_eq!(cfg.spreadsheet_id().unwrap(), "abc");
        assert_eq!(cfg.query, Query::default());
        assert_eq!(cfg.redirect_uri(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn query_table_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[query]
sender = "payinfo@121.ana.co.jp"
subject = "ご利用のお知らせ"
after = "2024-01-01"
before = "2024-06-30"
"#,
        )
        .unwrap();

        let cfg = load_config_with(&path, no_env).unwrap();
        assert_eq!(cfg.query.after, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(cfg.query.before, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert!(cfg.spreadsheet_id().is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut cfg = Config::template();
        let env: HashMap<&str, &str> = HashMap::from([
            ("SPREADSHEET_ID", "from-env"),
            ("GCP_TOKEN_PATH", "/tmp/token.json"),
            ("OAUTH_CLIENT_SECRET", "s3cret"),
        ]);

        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.spreadsheet_id().unwrap(), "from-env");
        assert_eq!(
            resolve_token_path(&cfg).unwrap(),
            PathBuf::from("/tmp/token.json")
        );
        assert_eq!(cfg.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.credentials_path, None);
    }
}
