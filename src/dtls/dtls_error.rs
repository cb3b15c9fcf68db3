use core::fmt;
use std::io;

use openssl::error::ErrorStack;

#[derive(Debug)]
pub enum DtlsError {
    Io(io::Error),
    Ssl(String),       // OpenSSL errors as string
    Handshake(String), // handshake failure (includes Failure/SetupFailure)
    /// Peer answered with an unexpected_message fatal alert; the only
    /// failure class the session retries.
    UnexpectedMessage(String),
    NoSrtpProfile,
    KeyExport(String),
    FingerprintMismatch {
        expected: String,
        computed: String,
    },
    /// Operation on a torn-down transport.
    Closed,
    /// receive() gave up waiting for a datagram.
    Timeout,
    CertificateGeneration(String),
}

impl DtlsError {
    /// Whether the handshake may be retried after this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DtlsError::UnexpectedMessage(_))
    }
}

impl fmt::Display for DtlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtlsError::Io(e) => write!(f, "IO error: {}", e),
            DtlsError::Ssl(s) => write!(f, "OpenSSL error: {}", s),
            DtlsError::Handshake(s) => write!(f, "Handshake error: {}", s),
            DtlsError::UnexpectedMessage(s) => write!(f, "Unexpected message alert: {}", s),
            DtlsError::NoSrtpProfile => write!(f, "No SRTP profile negotiated"),
            DtlsError::KeyExport(s) => write!(f, "Key export failed: {}", s),
            DtlsError::FingerprintMismatch { expected, computed } => write!(
                f,
                "Fingerprint mismatch: expected {expected}, computed {computed}"
            ),
            DtlsError::Closed => write!(f, "DTLS transport closed"),
            DtlsError::Timeout => write!(f, "DTLS receive timed out"),
            DtlsError::CertificateGeneration(s) => {
                write!(f, "Certificate generation failed: {}", s)
            }
        }
    }
}
impl std::error::Error for DtlsError {}

impl From<io::Error> for DtlsError {
    fn from(e: io::Error) -> Self {
        DtlsError::Io(e)
    }
}
impl From<ErrorStack> for DtlsError {
    fn from(e: ErrorStack) -> Self {
        DtlsError::Ssl(format!("{}", e))
    }
}
