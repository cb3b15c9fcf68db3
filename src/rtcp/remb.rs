use crate::rtcp::{
    common_header::{CommonHeader, finish_packet},
    packet_type::{FMT_AFB, PT_PSFB, RtcpPacketType},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

/// 4-byte unique identifier distinguishing REMB from other application-layer
/// feedback (PSFB FMT=15).
pub const REMB_IDENTIFIER: [u8; 4] = *b"REMB";

/// Largest value the 18-bit wire mantissa can hold.
pub const MAX_MANTISSA: u32 = 0x3_FFFF;
/// Largest value the 6-bit wire exponent can hold.
pub const MAX_EXP: u8 = 63;

/// Receiver Estimated Max Bitrate (draft-alvestrand-rmcat-remb).
///
/// Estimated bitrate in bps is `mantissa * 2^exp`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Remb {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub exp: u8,
    pub mantissa: u32,
    pub dest: Vec<u32>,
}

impl Remb {
    /// Build a REMB advertising `bitrate_bps` to the `dest` SSRC list.
    ///
    /// The mantissa is normalized by right-shifting until it fits 12 bits, so
    /// 1_500_000 encodes as mantissa 2929 / exp 9 (2929 * 512 = 1_499_648,
    /// the closest representable value from below).
    pub fn from_bitrate(sender_ssrc: u32, bitrate_bps: u64, dest: Vec<u32>) -> Result<Self, RtcpError> {
        let (mantissa, exp) = mantissa_exp(bitrate_bps)?;
        Ok(Self {
            sender_ssrc,
            media_ssrc: 0,
            exp,
            mantissa,
            dest,
        })
    }

    /// The advertised bitrate, saturating at `u64::MAX`.
    #[must_use]
    pub fn bitrate_bps(&self) -> u64 {
        let m = self.mantissa as u64;
        if m == 0 {
            return 0;
        }
        if (self.exp as u32) > m.leading_zeros() {
            u64::MAX
        } else {
            m << self.exp
        }
    }
}

/// Split a bitrate into the REMB (mantissa, exp) pair.
pub fn mantissa_exp(bitrate_bps: u64) -> Result<(u32, u8), RtcpError> {
    let mut mantissa = bitrate_bps;
    let mut exp = 0u8;
    while mantissa > 0xFFF {
        if exp == MAX_EXP {
            return Err(RtcpError::BitrateOutOfRange(bitrate_bps));
        }
        mantissa >>= 1;
        exp += 1;
    }
    Ok((mantissa as u32, exp))
}

impl RtcpPacketType for Remb {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.mantissa > MAX_MANTISSA || self.exp > MAX_EXP {
            return Err(RtcpError::Invalid);
        }
        if self.dest.len() > u8::MAX as usize {
            return Err(RtcpError::Invalid);
        }
        let start = out.len();
        let hdr = CommonHeader::new(FMT_AFB, PT_PSFB, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        out.extend_from_slice(&REMB_IDENTIFIER);
        out.push(self.dest.len() as u8);
        // exp in the top 6 bits, mantissa bits 17..16 in the low 2
        out.push((self.exp << 2) | ((self.mantissa >> 16) & 0x03) as u8);
        out.extend_from_slice(&((self.mantissa & 0xFFFF) as u16).to_be_bytes());
        for ssrc in &self.dest {
            out.extend_from_slice(&ssrc.to_be_bytes());
        }
        finish_packet(out, start);
        Ok(())
    }

    fn decode(_hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        // sender(4) + media(4) + "REMB"(4) + num(1) + exp/mantissa(3)
        if payload.len() < 16 {
            return Err(RtcpError::TooShort);
        }
        let sender_ssrc =
            u32::from_be_bytes(payload[0..4].try_into().map_err(|_| RtcpError::TooShort)?);
        let media_ssrc =
            u32::from_be_bytes(payload[4..8].try_into().map_err(|_| RtcpError::TooShort)?);
        if payload[8..12] != REMB_IDENTIFIER {
            return Err(RtcpError::Invalid);
        }
        let num_ssrc = payload[12] as usize;
        let exp = payload[13] >> 2;
        let mantissa = (((payload[13] & 0x03) as u32) << 16)
            | ((payload[14] as u32) << 8)
            | (payload[15] as u32);
        if payload.len() < 16 + num_ssrc * 4 {
            return Err(RtcpError::Truncated);
        }
        let mut dest = Vec::with_capacity(num_ssrc);
        let mut idx = 16usize;
        for _ in 0..num_ssrc {
            dest.push(u32::from_be_bytes(
                payload[idx..idx + 4]
                    .try_into()
                    .map_err(|_| RtcpError::Truncated)?,
            ));
            idx += 4;
        }
        Ok(RtcpPacket::Remb(Remb {
            sender_ssrc,
            media_ssrc,
            exp,
            mantissa,
            dest,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mantissa_exp_for_1_5_mbps() {
        let (mantissa, exp) = mantissa_exp(1_500_000).unwrap();
        assert_eq!((mantissa, exp), (2929, 9));
        assert_eq!((mantissa as u64) << exp, 1_499_648);
    }

    #[test]
    fn mantissa_exp_small_values_are_exact() {
        for bps in [0u64, 1, 1000, 4095] {
            let (mantissa, exp) = mantissa_exp(bps).unwrap();
            assert_eq!(exp, 0);
            assert_eq!(mantissa as u64, bps);
        }
    }

    #[test]
    fn roundtrip() {
        let remb = Remb::from_bitrate(0x11, 1_500_000, vec![0xA, 0xB]).unwrap();
        let mut buf = Vec::new();
        remb.encode_into(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 8 + 8 + 8);
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        assert_eq!(hdr.rc_or_fmt(), FMT_AFB);
        match Remb::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Remb(r) => {
                assert_eq!(r, remb);
                assert_eq!(r.bitrate_bps(), 1_499_648);
            }
            other => panic!("wrong packet: {other:?}"),
        }
    }

    #[test]
    fn sentinel_values_encode() {
        // Max/min throughput strategies force these; the codec must carry them.
        let max = Remb {
            sender_ssrc: 1,
            media_ssrc: 0,
            exp: 63,
            mantissa: 262_143,
            dest: vec![2],
        };
        let mut buf = Vec::new();
        max.encode_into(&mut buf).unwrap();
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        match Remb::decode(&hdr, &buf[4..]).unwrap() {
            RtcpPacket::Remb(r) => {
                assert_eq!(r.mantissa, 262_143);
                assert_eq!(r.exp, 63);
            }
            other => panic!("wrong packet: {other:?}"),
        }
    }

    #[test]
    fn bad_identifier_rejected() {
        let remb = Remb::from_bitrate(1, 100_000, vec![]).unwrap();
        let mut buf = Vec::new();
        remb.encode_into(&mut buf).unwrap();
        buf[8] = b'X';
        let (hdr, _) = CommonHeader::decode(&buf).unwrap();
        assert_eq!(
            Remb::decode(&hdr, &buf[4..]).unwrap_err(),
            RtcpError::Invalid
        );
    }
}
