use crate::srtp::{SrtpEndpointKeys, SrtpProfile};

/// Everything the cryptors need after a successful handshake: the negotiated
/// profile plus the outbound/inbound master material, already assigned by
/// DTLS role.
#[derive(Debug, Clone)]
pub struct SrtpSessionConfig {
    pub profile: SrtpProfile,
    pub outbound: SrtpEndpointKeys,
    pub inbound: SrtpEndpointKeys,
}
