//! Service-account tokens via a signed JWT assertion (RFC 7523).

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use log::info;
use ring::rand::SystemRandom;
use ring::signature::{RSA_PKCS1_SHA256, RsaKeyPair};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::AccessTokenProvider;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before Google's stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenReply {
    access_token: String,
    expires_in: Option<i64>,
}

pub struct ServiceAccount {
    key: ServiceAccountKey,
    scope: String,
    key_pair: RsaKeyPair,
    http: reqwest::blocking::Client,
    current: RefCell<Option<(String, i64)>>,
}

/// Decode the base64 body of a PKCS#8 PEM block.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("-----"))
        .collect();
    if body.is_empty() {
        return Err(anyhow!("private key PEM is empty"));
    }
    general_purpose::STANDARD
        .decode(body)
        .context("private key PEM is not valid base64")
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

impl ServiceAccount {
    pub fn from_file(path: &Path, scopes: &[&str]) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read service account key {}", path.display()))?;
        let key: ServiceAccountKey = serde_json::from_str(&s)
            .with_context(|| format!("malformed service account key {}", path.display()))?;
        Self::new(key, scopes)
    }

    pub fn new(key: ServiceAccountKey, scopes: &[&str]) -> Result<Self> {
        let der = pem_to_der(&key.private_key)?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| anyhow!("invalid service account private key: {e}"))?;
        Ok(Self {
            key,
            scope: scopes.join(" "),
            key_pair,
            http: reqwest::blocking::Client::new(),
            current: RefCell::new(None),
        })
    }

    fn claims(&self, now: i64) -> Claims {
        Claims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        }
    }

    fn assertion(&self, now: i64) -> Result<String> {
        let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        let signing_input = format!(
            "{}.{}",
            encode_segment(&header)?,
            encode_segment(&self.claims(now))?
        );

        let mut signature = vec![0; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(
                &RSA_PKCS1_SHA256,
                &SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| anyhow!("failed to sign service account assertion"))?;

        Ok(format!(
            "{signing_input}.{}",
            general_purpose::URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn exchange(&self, now: i64) -> Result<(String, i64)> {
        let assertion = self.assertion(now)?;
        let reply: TokenReply = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()?
            .error_for_status()
            .context("service account token exchange rejected")?
            .json()?;

        info!("obtained service account token for {}", self.key.client_email);
        let lifetime = reply.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        Ok((reply.access_token, now + lifetime - EXPIRY_MARGIN_SECS))
    }
}

impl AccessTokenProvider for ServiceAccount {
    fn access_token(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        if let Some((at, exp)) = self.current.borrow().as_ref()
            && now < *exp
        {
            return Ok(at.clone());
        }

        let (at, exp) = self.exchange(now)?;
        *self.current.borrow_mut() = Some((at.clone(), exp));
        Ok(at)
    }
}
