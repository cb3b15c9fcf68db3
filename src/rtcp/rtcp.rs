use crate::rtcp::packet_type::{self, FMT_AFB, FMT_FIR, FMT_NACK, FMT_PLI};

use super::{
    app::App, bye::Bye, common_header::CommonHeader, full_intra_request::FullIntraRequest,
    generic_nack::GenericNack, packet_type::RtcpPacketType, picture_loss::PictureLossIndication,
    receiver_report::ReceiverReport, remb::Remb, rtcp_error::RtcpError, sdes::Sdes,
    sender_report::SenderReport,
};

/// The union of supported RTCP packets.
///
/// `Raw` preserves records of unknown type (or unknown feedback format)
/// byte-for-byte so the bridge can pass them through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    App(App),
    Nack(GenericNack),          // Transport FB (205/FMT=1)
    Pli(PictureLossIndication), // Payload FB (206/FMT=1)
    Fir(FullIntraRequest),      // Payload FB (206/FMT=4)
    Remb(Remb),                 // Payload FB (206/FMT=15 + "REMB")
    Raw(Vec<u8>),
}

/// Result of a tolerant compound parse: surviving records plus the number of
/// malformed ones that were dropped.
#[derive(Debug, Default)]
pub struct CompoundParse {
    pub packets: Vec<RtcpPacket>,
    pub dropped: usize,
}

impl RtcpPacket {
    /// Decode a *compound* RTCP buffer into individual packets.
    ///
    /// Strict: any malformed record fails the whole buffer.
    pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>, RtcpError> {
        let mut out = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = CommonHeader::decode(&buf[idx..])?;
            let pkt_bytes = &buf[idx..idx + total];
            out.push(decode_one(&hdr, pkt_bytes)?);
            idx += total;
        }
        if idx != buf.len() {
            // trailing garbage / partial packet
            return Err(RtcpError::TooShort);
        }
        Ok(out)
    }

    /// Decode a compound buffer dropping malformed records instead of failing,
    /// as long as record boundaries remain determinable. An undecodable header
    /// aborts the rest of the buffer, counting one more drop.
    pub fn decode_compound_tolerant(buf: &[u8]) -> CompoundParse {
        let mut parse = CompoundParse::default();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = match CommonHeader::decode(&buf[idx..]) {
                Ok(v) => v,
                Err(_) => {
                    parse.dropped += 1;
                    return parse;
                }
            };
            match decode_one(&hdr, &buf[idx..idx + total]) {
                Ok(pkt) => parse.packets.push(pkt),
                Err(_) => parse.dropped += 1,
            }
            idx += total;
        }
        if idx != buf.len() {
            parse.dropped += 1;
        }
        parse
    }

    /// Encode a compound RTCP packet (concatenation of packets).
    pub fn encode_compound(pkts: &[RtcpPacket]) -> Result<Vec<u8>, RtcpError> {
        let mut out = Vec::new();
        for pkt in pkts {
            pkt.encode_into(&mut out)?;
        }
        Ok(out)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        match self {
            RtcpPacket::Sr(sr) => sr.encode_into(out),
            RtcpPacket::Rr(rr) => rr.encode_into(out),
            RtcpPacket::Sdes(sdes) => sdes.encode_into(out),
            RtcpPacket::Bye(bye) => bye.encode_into(out),
            RtcpPacket::App(app) => app.encode_into(out),
            RtcpPacket::Nack(nack) => nack.encode_into(out),
            RtcpPacket::Pli(pli) => pli.encode_into(out),
            RtcpPacket::Fir(fir) => fir.encode_into(out),
            RtcpPacket::Remb(remb) => remb.encode_into(out),
            RtcpPacket::Raw(bytes) => {
                out.extend_from_slice(bytes);
                Ok(())
            }
        }
    }

    /// Encoded size in bytes. Used by the MTU-aware compound packer.
    pub fn wire_len(&self) -> Result<usize, RtcpError> {
        let mut scratch = Vec::new();
        self.encode_into(&mut scratch)?;
        Ok(scratch.len())
    }
}

fn decode_one(hdr: &CommonHeader, pkt_bytes: &[u8]) -> Result<RtcpPacket, RtcpError> {
    let payload = &pkt_bytes[4..];
    match hdr.pt() {
        packet_type::PT_SR => SenderReport::decode(hdr, payload),
        packet_type::PT_RR => ReceiverReport::decode(hdr, payload),
        packet_type::PT_SDES => Sdes::decode(hdr, payload),
        packet_type::PT_BYE => Bye::decode(hdr, payload),
        packet_type::PT_APP => App::decode(hdr, payload),
        packet_type::PT_RTPFB => match hdr.rc_or_fmt() {
            FMT_NACK => GenericNack::decode(hdr, payload),
            _ => Ok(RtcpPacket::Raw(pkt_bytes.to_vec())),
        },
        packet_type::PT_PSFB => match hdr.rc_or_fmt() {
            FMT_PLI => PictureLossIndication::decode(hdr, payload),
            FMT_FIR => FullIntraRequest::decode(hdr, payload),
            FMT_AFB => {
                // AFB carrying something other than REMB stays opaque
                match Remb::decode(hdr, payload) {
                    Ok(pkt) => Ok(pkt),
                    Err(RtcpError::Invalid) => Ok(RtcpPacket::Raw(pkt_bytes.to_vec())),
                    Err(e) => Err(e),
                }
            }
            _ => Ok(RtcpPacket::Raw(pkt_bytes.to_vec())),
        },
        // Unknown packet types are preserved as opaque pass-through
        _ => Ok(RtcpPacket::Raw(pkt_bytes.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcp::report_block::ReportBlock;
    use crate::rtcp::sender_info::SenderInfo;

    fn sample_compound() -> Vec<RtcpPacket> {
        vec![
            RtcpPacket::Sr(SenderReport::new(
                0x1111,
                SenderInfo {
                    ntp_msw: 10,
                    ntp_lsw: 20,
                    rtp_ts: 30,
                    packet_count: 40,
                    octet_count: 50,
                },
                vec![ReportBlock {
                    ssrc: 0x2222,
                    fraction_lost: 1,
                    cumulative_lost: 2,
                    highest_seq_no_received: 3,
                    interarrival_jitter: 4,
                    lsr: 5,
                    dlsr: 6,
                }],
            )),
            RtcpPacket::Rr(ReceiverReport::new(0x1111, vec![])),
            RtcpPacket::Sdes(Sdes::cname(0x1111, b"bridge@sfu".to_vec())),
            RtcpPacket::Remb(Remb::from_bitrate(0x1111, 1_000_000, vec![0x2222]).unwrap()),
            RtcpPacket::Pli(PictureLossIndication {
                sender_ssrc: 0x1111,
                media_ssrc: 0x2222,
            }),
        ]
    }

    #[test]
    fn compound_roundtrip() {
        let pkts = sample_compound();
        let buf = RtcpPacket::encode_compound(&pkts).unwrap();
        let dec = RtcpPacket::decode_compound(&buf).unwrap();
        assert_eq!(dec, pkts);
    }

    #[test]
    fn unknown_packet_type_preserved() {
        // PT 210 does not exist; 4-byte header + 4-byte body
        let raw = vec![0x80, 210, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF];
        let dec = RtcpPacket::decode_compound(&raw).unwrap();
        assert_eq!(dec, vec![RtcpPacket::Raw(raw.clone())]);
        let re = RtcpPacket::encode_compound(&dec).unwrap();
        assert_eq!(re, raw);
    }

    #[test]
    fn unknown_psfb_format_preserved() {
        // PSFB with FMT=7 (unassigned): sender + media ssrc only
        let mut raw = vec![0x87, 206, 0, 2];
        raw.extend_from_slice(&1u32.to_be_bytes());
        raw.extend_from_slice(&2u32.to_be_bytes());
        let dec = RtcpPacket::decode_compound(&raw).unwrap();
        assert_eq!(dec, vec![RtcpPacket::Raw(raw)]);
    }

    #[test]
    fn tolerant_parse_keeps_good_records() {
        let good = RtcpPacket::Rr(ReceiverReport::new(7, vec![]));
        let mut buf = RtcpPacket::encode_compound(&[good.clone()]).unwrap();
        // Append a record with a valid header but truncated SR body:
        // declared length 1 word -> 8 bytes total, SR needs 24 payload bytes.
        buf.extend_from_slice(&[0x80, 200, 0, 1, 0, 0, 0, 9]);
        let parse = RtcpPacket::decode_compound_tolerant(&buf);
        assert_eq!(parse.packets, vec![good]);
        assert_eq!(parse.dropped, 1);
    }

    #[test]
    fn trailing_garbage_detected() {
        let pkts = vec![RtcpPacket::Rr(ReceiverReport::new(7, vec![]))];
        let mut buf = RtcpPacket::encode_compound(&pkts).unwrap();
        buf.extend_from_slice(&[0x80, 200]); // partial header
        assert!(RtcpPacket::decode_compound(&buf).is_err());
        let parse = RtcpPacket::decode_compound_tolerant(&buf);
        assert_eq!(parse.packets.len(), 1);
        assert_eq!(parse.dropped, 1);
    }
}
