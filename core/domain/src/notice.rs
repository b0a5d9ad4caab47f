use crate::error::DomainError;
use serde::Serialize;
/// Json notices the gateway sends to the client in explicit connect mode.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerNotice {
    Connected,
    Error { message: String },
}
impl ServerNotice {
    pub fn to_json(&self) -> Result<String, DomainError> {
        Ok(serde_json::to_string(self)?)
    }
}
