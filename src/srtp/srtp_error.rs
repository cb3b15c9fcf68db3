use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrtpError {
    /// Packet shorter than the minimal header + tag for its kind.
    TooShort,
    /// RTP header fields inconsistent with the buffer length.
    BadHeader,
    /// HMAC tag mismatch.
    AuthFail,
    /// Packet index already seen or older than the replay window.
    Replay,
    /// Session key material of an unexpected length.
    InvalidKey,
    /// Unknown protection profile name on the wire.
    UnknownProfile(String),
}

impl fmt::Display for SrtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrtpError::TooShort => write!(f, "packet too short"),
            SrtpError::BadHeader => write!(f, "malformed RTP header"),
            SrtpError::AuthFail => write!(f, "authentication tag mismatch"),
            SrtpError::Replay => write!(f, "replayed or too-old packet index"),
            SrtpError::InvalidKey => write!(f, "invalid session key material"),
            SrtpError::UnknownProfile(name) => write!(f, "unknown SRTP profile: {name}"),
        }
    }
}
impl std::error::Error for SrtpError {}
