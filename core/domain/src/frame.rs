use crate::destination::Destination;
use crate::error::DomainError;
use bytes::Bytes;
use serde::Deserialize;
/// The structured directives a client can send instead of raw sip text.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientDirectivePayload {
    Connect {
        #[serde(rename = "sipServer")]
        sip_server: String,
    },
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientDirective {
    Connect(Destination),
}
/// One inbound websocket message, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Directive(ClientDirective),
    RawText(String),
    Binary(Bytes),
}
impl ClientFrame {
    /// Decode a text message.
    ///
    /// Only a json object carrying a known `type` is a directive, everything
    /// else (sip text included) is kept verbatim as raw text. A connect
    /// directive with an unusable `sipServer` is an error.
    pub fn decode_text(text: String, default_sip_port: u16) -> Result<Self, DomainError> {
        if !text.trim_start().starts_with('{') {
            return Ok(ClientFrame::RawText(text));
        }
        match serde_json::from_str::<ClientDirectivePayload>(&text) {
            Ok(ClientDirectivePayload::Connect { sip_server }) => {
                let destination = Destination::parse(&sip_server, default_sip_port)?;
                Ok(ClientFrame::Directive(ClientDirective::Connect(destination)))
            }
            Err(_) => Ok(ClientFrame::RawText(text)),
        }
    }
}
impl From<Bytes> for ClientFrame {
    fn from(value: Bytes) -> Self {
        ClientFrame::Binary(value)
    }
}
