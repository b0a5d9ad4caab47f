use derive_more::Display;
/// The status of one relay session, `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Closed,
}
