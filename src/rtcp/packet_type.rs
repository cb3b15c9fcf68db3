use super::{common_header::CommonHeader, rtcp::RtcpPacket, rtcp_error::RtcpError};

// RTCP packet types (per RFC3550; feedback per RFC4585/5104)
pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTPFB: u8 = 205; // Transport layer FB (e.g., Generic NACK)
pub const PT_PSFB: u8 = 206; // Payload-specific FB (PLI, FIR, REMB)

// Feedback message types carried in the 5-bit FMT field
pub const FMT_NACK: u8 = 1;
pub const FMT_PLI: u8 = 1;
pub const FMT_FIR: u8 = 4;
pub const FMT_AFB: u8 = 15; // application-layer FB, carries REMB

/// Common surface for every RTCP packet kind: full encode (header included)
/// and decode from an already-parsed [`CommonHeader`] plus payload.
pub trait RtcpPacketType {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError>;

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError>;
}
