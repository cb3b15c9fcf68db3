//! DTLS-SRTP: handshake transport, session worker, certificate identity and
//! fingerprint pinning.

pub mod certificate;
pub mod datagram_channel;
pub mod dtls_error;
pub mod dtls_role;
pub mod fingerprint;
pub mod record;
pub mod runtime;
pub mod session;

pub use datagram_channel::{DatagramChannel, DatagramSink};
pub use dtls_error::DtlsError;
pub use dtls_role::{DtlsRole, Setup};
pub use runtime::HandshakeParams;
pub use session::{DtlsSession, DtlsSessionState};
