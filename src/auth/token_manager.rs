use anyhow::{Result, anyhow};
use log::{info, warn};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::client_secrets::load_client_secrets;
use crate::auth::{AccessTokenProvider, oauth, token_store, tokens_file};
use crate::config::{Config, resolve_token_path};

/// Assumed lifetime when Google omits `expires_in`.
const FALLBACK_LIFETIME_SECS: i64 = 3500;

/// User OAuth tokens for the mail account: cached token, then refresh token,
/// then the interactive browser flow.
pub struct TokenManager {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub user_email: String,
    pub token_path: PathBuf,
    pub scopes: Vec<&'static str>,
    current: RefCell<Option<(String, i64)>>,
}

/// What the token cache offers for the scopes a manager asks for.
#[derive(Debug, PartialEq, Eq)]
enum CacheState {
    Valid(String, i64),
    /// Granted for these scopes but expired; the stored refresh token renews
    /// the same grant.
    Expired,
    /// Missing, or granted for fewer scopes than requested. Only the
    /// interactive flow can widen it.
    Unusable,
}

fn now_epoch() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

impl TokenManager {
    pub fn from_config(cfg: &Config, scopes: &[&'static str]) -> Result<Self> {
        let (client_id, file_secret) = match &cfg.credentials_path {
            Some(path) => {
                let secrets = load_client_secrets(Path::new(path))?;
                (secrets.client_id, secrets.client_secret)
            }
            None => (
                cfg.client_id
                    .clone()
                    .ok_or_else(|| anyhow!("client_id not set in config or GCP_CREDENTIALS_PATH"))?,
                None,
            ),
        };

        let client_secret = match file_secret {
            Some(s) => Some(s),
            None => token_store::load_client_secret(&client_id)?.or_else(|| cfg.client_secret.clone()),
        };

        let user_email = cfg.user_email.clone().unwrap_or_else(|| "default".to_string());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: cfg.redirect_uri().to_string(),
            user_email,
            token_path: resolve_token_path(cfg)?,
            scopes: scopes.to_vec(),
            current: RefCell::new(None),
        })
    }

    fn remember(&self, tokens: &oauth::Tokens, now: i64) -> Result<i64> {
        let exp = tokens
            .expires_in
            .map(|s| now + s as i64)
            .unwrap_or(now + FALLBACK_LIFETIME_SECS);
        let granted = match &tokens.scopes {
            Some(granted) => granted.clone(),
            None => self.scopes.iter().map(|s| s.to_string()).collect(),
        };
        tokens_file::save_tokens(
            &self.token_path,
            Some(&tokens.access_token),
            Some(exp),
            &granted,
        )?;

        if let Some(rt) = &tokens.refresh_token
            && let Err(e) = token_store::save_refresh_token(&self.user_email, rt)
        {
            warn!("couldn't save refresh token to keyring: {e}");
        }
        Ok(exp)
    }

    /// Inspect the token cache for the requested scopes.
    fn cache_state(&self, now: i64) -> Result<CacheState> {
        let Some(tf) = tokens_file::load_tokens(&self.token_path)? else {
            return Ok(CacheState::Unusable);
        };
        if !tf.covers(&self.scopes) {
            info!("cached grant lacks requested scopes {:?}", self.scopes);
            return Ok(CacheState::Unusable);
        }
        Ok(match (tf.valid_token(now, &self.scopes), tf.expires_at_epoch) {
            (Some(at), Some(exp)) => CacheState::Valid(at.to_string(), exp),
            _ => CacheState::Expired,
        })
    }

    fn fetch(&self, now: i64) -> Result<(String, i64)> {
        match self.cache_state(now)? {
            CacheState::Valid(at, exp) => return Ok((at, exp)),
            CacheState::Expired => {
                if let Some(rt) = token_store::load_refresh_token(&self.user_email)? {
                    info!("access token expired; refreshing");
                    match oauth::refresh_access_token(
                        &self.client_id,
                        self.client_secret.as_deref(),
                        &rt,
                    ) {
                        Ok(t) => {
                            let exp = self.remember(&t, now)?;
                            return Ok((t.access_token, exp));
                        }
                        Err(e) => warn!("refresh failed: {e}; falling back to interactive auth"),
                    }
                }
            }
            CacheState::Unusable => {}
        }

        info!("no usable token; running interactive PKCE auth flow");
        let t = oauth::perform_pkce_flow(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.redirect_uri,
            &self.scopes,
        )?;
        let exp = self.remember(&t, now)?;
        Ok((t.access_token, exp))
    }
}

impl AccessTokenProvider for TokenManager {
    fn access_token(&self) -> Result<String> {
        let now = now_epoch()?;
        if let Some((at, exp)) = self.current.borrow().as_ref()
            && now < *exp
        {
            return Ok(at.clone());
        }

        let (at, exp) = self.fetch(now)?;
        *self.current.borrow_mut() = Some((at.clone(), exp));
        Ok(at)
    }
}
