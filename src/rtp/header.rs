use byteorder::{BigEndian, ByteOrder};

/// Fixed RTP header size before CSRCs and extensions.
pub const RTP_FIXED_HEADER_LEN: usize = 12;

/// Borrowed view of the RTP header fields the bridge cares about; no payload
/// interpretation, no allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeaderView {
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Offset of the payload (after CSRCs and any header extension).
    pub header_len: usize,
}

impl RtpHeaderView {
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < RTP_FIXED_HEADER_LEN || packet[0] >> 6 != 2 {
            return None;
        }
        let cc = (packet[0] & 0x0F) as usize;
        let has_ext = packet[0] & 0x10 != 0;
        let mut header_len = RTP_FIXED_HEADER_LEN + cc * 4;
        if has_ext {
            if packet.len() < header_len + 4 {
                return None;
            }
            let ext_words = BigEndian::read_u16(&packet[header_len + 2..header_len + 4]) as usize;
            header_len += 4 + ext_words * 4;
        }
        if packet.len() < header_len {
            return None;
        }
        Some(Self {
            payload_type: packet[1] & 0x7F,
            sequence_number: BigEndian::read_u16(&packet[2..4]),
            timestamp: BigEndian::read_u32(&packet[4..8]),
            ssrc: BigEndian::read_u32(&packet[8..12]),
            header_len,
        })
    }

    #[must_use]
    pub fn payload_len(&self, packet: &[u8]) -> usize {
        packet.len().saturating_sub(self.header_len)
    }
}

/// RTP/RTCP discrimination per RFC 5761 §4: RTCP packet types 200..=206 sit
/// where RTP would carry PT 72..78 with the marker bit set.
#[must_use]
pub fn is_rtcp(packet: &[u8]) -> bool {
    packet.len() >= 2 && (200..=206).contains(&packet[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_header() {
        let mut pkt = vec![0x80, 0x60, 0x12, 0x34, 0, 0, 0, 50, 0xDE, 0xAD, 0xBE, 0xEF];
        pkt.extend_from_slice(b"payload");
        let h = RtpHeaderView::parse(&pkt).unwrap();
        assert_eq!(h.payload_type, 96);
        assert_eq!(h.sequence_number, 0x1234);
        assert_eq!(h.timestamp, 50);
        assert_eq!(h.ssrc, 0xDEAD_BEEF);
        assert_eq!(h.header_len, 12);
        assert_eq!(h.payload_len(&pkt), 7);
    }

    #[test]
    fn accounts_for_csrcs_and_extension() {
        let mut pkt = vec![0x80 | 0x10 | 0x01, 96, 0, 1];
        pkt.extend_from_slice(&[0u8; 8]); // ts + ssrc
        pkt.extend_from_slice(&[0u8; 4]); // one CSRC
        pkt.extend_from_slice(&[0xBE, 0xDE, 0, 2]); // ext header, 2 words
        pkt.extend_from_slice(&[0u8; 8]);
        pkt.extend_from_slice(b"xy");
        let h = RtpHeaderView::parse(&pkt).unwrap();
        assert_eq!(h.header_len, 12 + 4 + 4 + 8);
        assert_eq!(h.payload_len(&pkt), 2);
    }

    #[test]
    fn rejects_non_rtp() {
        assert!(RtpHeaderView::parse(&[0x00, 0x01]).is_none());
        let stun = [0x00u8; 20];
        assert!(RtpHeaderView::parse(&stun).is_none());
    }

    #[test]
    fn rtcp_discrimination() {
        assert!(is_rtcp(&[0x80, 200]));
        assert!(is_rtcp(&[0x81, 206]));
        assert!(!is_rtcp(&[0x80, 96]));
        assert!(!is_rtcp(&[0x80, 207]));
    }
}
