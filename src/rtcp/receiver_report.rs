use crate::rtcp::{
    packet_type::{PT_RR, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
    sender_report::MAX_RC,
};

use super::{
    common_header::{CommonHeader, finish_packet},
    report_block::ReportBlock,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
    pub profile_ext: Vec<u8>,
}

impl RtcpPacketType for ReceiverReport {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.reports.len() > MAX_RC {
            return Err(RtcpError::TooManyReportBlocks(self.reports.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.reports.len() as u8, PT_RR, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for rb in &self.reports {
            rb.encode_into(out);
        }
        out.extend_from_slice(&self.profile_ext);
        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        if payload.len() < 4 {
            return Err(RtcpError::TooShort);
        }
        let ssrc = u32::from_be_bytes(payload[0..4].try_into().map_err(|_| RtcpError::TooShort)?);
        let mut idx = 4usize;

        let rc = hdr.rc_or_fmt() as usize;
        let mut reports = Vec::with_capacity(rc);
        for _ in 0..rc {
            if payload.len() < idx + 24 {
                return Err(RtcpError::Truncated);
            }
            let (rb, used) = ReportBlock::decode(&payload[idx..])?;
            idx += used;
            reports.push(rb);
        }
        let profile_ext = payload[idx..].to_vec();
        Ok(RtcpPacket::Rr(ReceiverReport {
            ssrc,
            reports,
            profile_ext,
        }))
    }
}

impl ReceiverReport {
    pub fn new(ssrc: u32, reports: Vec<ReportBlock>) -> Self {
        Self {
            ssrc,
            reports,
            profile_ext: Vec::new(),
        }
    }
}
