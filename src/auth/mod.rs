pub mod client_secrets;
pub mod oauth;
pub mod service_account;
pub mod token_manager;
pub mod token_store;
pub mod tokens_file;

use anyhow::Result;

/// Supplies bearer tokens for the Google API clients.
///
/// Implementations own refresh and caching; callers ask once per request.
pub trait AccessTokenProvider {
    fn access_token(&self) -> Result<String>;
}

/// A fixed token, for callers that already hold one.
pub struct StaticToken(pub String);

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
