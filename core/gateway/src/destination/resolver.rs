use crate::error::GatewayError;
use regex::Regex;
use sipws_domain::Destination;
// The host stops at whitespace, `;` or `:`; the from pattern also stops at `>`.
const REGISTER_PATTERN: &str = r"(?i)REGISTER\s+sip:([^\s;:]+)";
const VIA_PATTERN: &str = r"(?i)Via:\s*SIP/2\.0/[A-Z]+\s+([^\s;:]+)";
const FROM_PATTERN: &str = r"(?i)From:\s*<?sip:[^@\s>]+@([^\s;:>]+)";
/// Infers the sip server from the first sip message of a session.
#[derive(Debug)]
pub struct DestinationResolver {
    host_patterns: [Regex; 3],
    default_host: String,
    default_port: u16,
}
impl DestinationResolver {
    pub fn new(default_host: impl Into<String>, default_port: u16) -> Result<Self, GatewayError> {
        Ok(Self {
            host_patterns: [
                Regex::new(REGISTER_PATTERN)?,
                Regex::new(VIA_PATTERN)?,
                Regex::new(FROM_PATTERN)?,
            ],
            default_host: default_host.into(),
            default_port,
        })
    }
    /// Try the register request uri, then the via host, then the from host,
    /// falling back to the default host. Never fails.
    pub fn resolve(&self, first_message: &str) -> Destination {
        let host = self
            .host_patterns
            .iter()
            .find_map(|pattern| {
                pattern
                    .captures(first_message)
                    .and_then(|captures| captures.get(1))
                    .map(|host| host.as_str().to_string())
            })
            .unwrap_or_else(|| self.default_host.clone());
        Destination::new(host, self.default_port)
    }
}
