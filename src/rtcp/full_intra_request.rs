use crate::rtcp::{
    common_header::{CommonHeader, finish_packet},
    packet_type::{FMT_FIR, PT_PSFB, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

/// One FIR FCI entry per RFC5104 §4.3.1: target SSRC + command sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirEntry {
    pub ssrc: u32,
    pub seq_nr: u8,
}

// Feedback: FIR (PSFB, FMT=4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub entries: Vec<FirEntry>,
}

impl RtcpPacketType for FullIntraRequest {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(FMT_FIR, PT_PSFB, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.ssrc.to_be_bytes());
            out.push(e.seq_nr);
            out.extend_from_slice(&[0u8; 3]); // reserved
        }
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
        let mut idx = 8usize;
        let mut entries = Vec::new();
        while idx + 8 <= payload.len() {
            let ssrc =
                u32::from_be_bytes(payload[idx..idx + 4].try_into().map_err(|_| RtcpError::Truncated)?);
            entries.push(FirEntry {
                ssrc,
                seq_nr: payload[idx + 4],
            });
            idx += 8;
        }
        if idx != payload.len() {
            return Err(RtcpError::Truncated);
        }
        Ok(RtcpPacket::Fir(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            entries,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_two_entries() {
        let fir = FullIntraRequest {
            sender_ssrc: 1,
            media_ssrc: 0,
            entries: vec![
                FirEntry { ssrc: 10, seq_nr: 3 },
                FirEntry { ssrc: 11, seq_nr: 4 },
            ],
        };
        let mut buf = Vec::new();
        fir.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 8 + 16);
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        assert_eq!(hdr.rc_or_fmt(), FMT_FIR);
        match FullIntraRequest::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Fir(f) => assert_eq!(f, fir),
            other => panic!("wrong packet: {other:?}"),
        }
    }
}
