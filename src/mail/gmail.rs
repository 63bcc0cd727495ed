//! Gmail REST v1 client (`users.messages.list` / `users.messages.get`).

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;
use std::rc::Rc;
use url::Url;

use crate::auth::AccessTokenProvider;
use crate::domain::{Header, MessageBody, MessagePart, RawMessage};
use crate::error::{ServiceError, ServiceResult};
use crate::google::GoogleApi;
use crate::mail::{MailService, MessagePage};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/";

/// Gmail sends base64url, sometimes without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct GmailMessage {
    id: String,
    payload: Option<Payload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<PartBody>,
    parts: Option<Vec<Payload>>,
}

#[derive(Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct PartBody {
    data: Option<String>,
}

fn decode_body(body: Option<PartBody>) -> ServiceResult<Option<Vec<u8>>> {
    let Some(data) = body.and_then(|b| b.data) else {
        return Ok(None);
    };
    BODY_ENGINE
        .decode(data.as_bytes())
        .map(Some)
        .map_err(|e| ServiceError::Decode {
            service: "gmail",
            message: format!("message body is not base64url: {e}"),
        })
}

impl GmailMessage {
    fn into_raw(self) -> ServiceResult<RawMessage> {
        let Some(payload) = self.payload else {
            return Ok(RawMessage {
                id: self.id,
                headers: vec![],
                body: MessageBody::Single(None),
            });
        };

        let headers = payload
            .headers
            .into_iter()
            .map(|h| Header {
                name: h.name,
                value: h.value,
            })
            .collect();

        let body = match payload.parts {
            Some(parts) => MessageBody::Parts(
                parts
                    .into_iter()
                    .map(|p| {
                        Ok(MessagePart {
                            mime_type: p.mime_type,
                            data: decode_body(p.body)?,
                        })
                    })
                    .collect::<ServiceResult<_>>()?,
            ),
            None => MessageBody::Single(decode_body(payload.body)?),
        };

        Ok(RawMessage {
            id: self.id,
            headers,
            body,
        })
    }
}

pub struct GmailClient {
    api: GoogleApi,
    base: Url,
    user_id: String,
}

impl GmailClient {
    pub fn new(tokens: Rc<dyn AccessTokenProvider>) -> ServiceResult<Self> {
        Self::with_base(tokens, GMAIL_API_BASE)
    }

    pub fn with_base(tokens: Rc<dyn AccessTokenProvider>, base: &str) -> ServiceResult<Self> {
        let base = Url::parse(base).map_err(|e| ServiceError::Decode {
            service: "gmail",
            message: format!("bad API base {base}: {e}"),
        })?;
        Ok(Self {
            api: GoogleApi::new("gmail", tokens),
            base,
            user_id: "me".to_string(),
        })
    }

    fn messages_url(&self, id: Option<&str>) -> ServiceResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Decode {
                service: "gmail",
                message: "API base cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["users", self.user_id.as_str(), "messages"])
            .extend(id);
        Ok(url)
    }
}

impl MailService for GmailClient {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> ServiceResult<MessagePage> {
        let mut url = self.messages_url(None)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }

        let resp: ListResponse = self.api.get_json(url)?;
        Ok(MessagePage {
            ids: resp.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    fn get_message(&self, id: &str) -> ServiceResult<RawMessage> {
        let mut url = self.messages_url(Some(id))?;
        url.query_pairs_mut().append_pair("format", "full");

        let msg: GmailMessage = self.api.get_json(url)?;
        msg.into_raw()
    }
}
