use crate::rtcp::{
    common_header::{CommonHeader, finish_packet},
    packet_type::{PT_BYE, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    pub sources: Vec<u32>,
    pub reason: Option<String>,
}

impl RtcpPacketType for Bye {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.sources.len() >= 31 {
            return Err(RtcpError::TooManyByeSources(self.sources.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.sources.len() as u8, PT_BYE, false);
        hdr.encode_into(out);
        for ssrc in &self.sources {
            out.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            let rbytes = reason.as_bytes();
            out.push(u8::try_from(rbytes.len()).unwrap_or(0));
            out.extend_from_slice(rbytes);
        }
        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        // rc_or_fmt carries the SSRC/CSRC count
        let sc = hdr.rc_or_fmt() as usize;
        if payload.len() < sc * 4 {
            return Err(RtcpError::Truncated);
        }
        let mut sources = Vec::with_capacity(sc);
        let mut idx = 0usize;
        for _ in 0..sc {
            let ssrc =
                u32::from_be_bytes(payload[idx..idx + 4].try_into().map_err(|_| RtcpError::Truncated)?);
            sources.push(ssrc);
            idx += 4;
        }
        let reason = if payload.len() > idx {
            let len = payload[idx] as usize;
            idx += 1;
            if payload.len() < idx + len {
                return Err(RtcpError::Truncated);
            }
            Some(String::from_utf8_lossy(&payload[idx..idx + len]).into_owned())
        } else {
            None
        };
        Ok(RtcpPacket::Bye(Bye { sources, reason }))
    }
}

impl Bye {
    pub fn single(ssrc: u32, reason: Option<String>) -> Self {
        Self {
            sources: vec![ssrc],
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_reason() {
        let bye = Bye::single(0xAA55_AA55, Some("teardown".into()));
        let mut buf = Vec::new();
        bye.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        match Bye::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Bye(b) => {
                assert_eq!(b.sources, vec![0xAA55_AA55]);
                assert_eq!(b.reason.as_deref(), Some("teardown"));
            }
            other => panic!("wrong packet: {other:?}"),
        }
    }

    #[test]
    fn roundtrip_without_reason() {
        let bye = Bye {
            sources: vec![1, 2, 3],
            reason: None,
        };
        let mut buf = Vec::new();
        bye.encode_into(&mut buf).unwrap();
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        match Bye::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Bye(b) => {
                assert_eq!(b.sources, vec![1, 2, 3]);
                assert_eq!(b.reason, None);
            }
            other => panic!("wrong packet: {other:?}"),
        }
    }
}
