pub mod gmail;
pub mod source;

use crate::domain::RawMessage;
use crate::error::ServiceResult;

pub use gmail::GmailClient;
pub use source::{MessageSource, Messages};

/// One page of a message search: ids only, bodies need a second call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// The two calls the importer needs from a mail service.
pub trait MailService {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> ServiceResult<MessagePage>;
    fn get_message(&self, id: &str) -> ServiceResult<RawMessage>;
}
