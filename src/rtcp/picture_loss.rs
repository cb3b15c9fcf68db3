use crate::rtcp::{
    common_header::{CommonHeader, finish_packet},
    packet_type::{FMT_PLI, PT_PSFB, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

// Feedback: PLI (PSFB, FMT=1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl RtcpPacketType for PictureLossIndication {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(FMT_PLI, PT_PSFB, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        // no FCI for PLI
        finish_packet(out, start);
        Ok(())
    }

    fn decode(_hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        if payload.len() < 8 {
            return Err(RtcpError::TooShort);
        }
        let sender_ssrc =
            u32::from_be_bytes(payload[0..4].try_into().map_err(|_| RtcpError::TooShort)?);
        let media_ssrc =
            u32::from_be_bytes(payload[4..8].try_into().map_err(|_| RtcpError::TooShort)?);
        Ok(RtcpPacket::Pli(PictureLossIndication {
            sender_ssrc,
            media_ssrc,
        }))
    }
}
