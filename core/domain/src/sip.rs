/// The default sip signaling port.
pub const DEFAULT_SIP_PORT: u16 = 5060;
/// Sent to the client when the sip server can not be reached.
pub const SERVICE_UNAVAILABLE_RESPONSE: &str =
    "SIP/2.0 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n";
