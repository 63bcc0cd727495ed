use anyhow::{Context, Result};

/// A message header as delivered by the mail service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One top-level MIME part. `data` is already transfer-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub mime_type: String,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Non-multipart message: the payload body itself.
    Single(Option<Vec<u8>>),
    /// Multipart message: its direct sub-parts, in order.
    Parts(Vec<MessagePart>),
}

/// A fetched message, held only for the duration of one parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    pub headers: Vec<Header>,
    pub body: MessageBody,
}

impl RawMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// The `text/plain` payload, if the message has one.
    pub fn plain_text(&self) -> Option<&[u8]> {
        match &self.body {
            MessageBody::Parts(parts) => parts
                .iter()
                .find(|p| p.mime_type == "text/plain")
                .and_then(|p| p.data.as_deref()),
            MessageBody::Single(data) => data.as_deref(),
        }
    }

    /// Build a message from raw RFC 822 bytes (an `.eml` file).
    pub fn from_rfc822(id: impl Into<String>, raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw).context("failed to parse RFC 822 message")?;

        let headers = parsed
            .headers
            .iter()
            .map(|h| Header {
                name: h.get_key(),
                value: h.get_value(),
            })
            .collect();

        let body = if parsed.subparts.is_empty() {
            MessageBody::Single(parsed.get_body().ok().map(String::into_bytes))
        } else {
            MessageBody::Parts(
                parsed
                    .subparts
                    .iter()
                    .map(|p| MessagePart {
                        mime_type: p.ctype.mimetype.to_ascii_lowercase(),
                        data: p.get_body().ok().map(String::into_bytes),
                    })
                    .collect(),
            )
        };

        Ok(Self {
            id: id.into(),
            headers,
            body,
        })
    }
}
