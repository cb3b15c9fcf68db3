use crate::log::log_sink::LogSink;
use crate::srtp::replay_window::ReplayWindow;
use crate::srtp::session_keys::SessionKeys;
use crate::srtp::srtp_error::SrtpError;
use crate::srtp::utils::{
    Aes128Ctr, HmacSha1, compute_iv, constant_time_eq, derive_rtp_session_keys, get_rtp_header_len,
};
use crate::srtp::{SrtpEndpointKeys, SrtpProfile};
use crate::{sink_error, sink_trace, sink_warn};
use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use hmac::Mac;
use std::collections::HashMap;
use std::sync::Arc;

/// One direction of SRTP for a media lane.
///
/// Per-SSRC rollover counters, highest-seq tracking and replay windows; a lane
/// may carry several bundled sources under the same master key.
pub struct SrtpContext {
    logger: Arc<dyn LogSink>,
    profile: SrtpProfile,
    session_keys: SessionKeys,
    rocs: HashMap<u32, u32>,
    last_seqs: HashMap<u32, u16>,
    replay_windows: HashMap<u32, ReplayWindow>,
}

impl SrtpContext {
    pub fn new(
        logger: Arc<dyn LogSink>,
        profile: SrtpProfile,
        master_keys: &SrtpEndpointKeys,
    ) -> Self {
        let session_keys = derive_rtp_session_keys(master_keys);
        Self {
            logger,
            profile,
            session_keys,
            rocs: HashMap::new(),
            last_seqs: HashMap::new(),
            replay_windows: HashMap::new(),
        }
    }

    pub fn profile(&self) -> SrtpProfile {
        self.profile
    }

    /// Encrypt + authenticate an outbound RTP packet in place, appending the
    /// truncated tag.
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < 12 {
            return Err(SrtpError::TooShort);
        }

        let seq = BigEndian::read_u16(&packet[2..4]);
        let ssrc = BigEndian::read_u32(&packet[8..12]);
        let roc = self.advance_roc(ssrc, seq);
        let index = ((roc as u64) << 16) | (seq as u64);

        let header_len = get_rtp_header_len(packet)?;

        if self.profile.cipher_enabled() {
            let iv = compute_iv(&self.session_keys.salt, ssrc, index);
            let mut cipher = Aes128Ctr::new(&self.session_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[header_len..]);
        }

        let tag_len = self.profile.rtp_tag_len();
        let tag = self.rtp_tag(packet, roc)?;
        packet.extend_from_slice(&tag[..tag_len]);

        sink_trace!(
            self.logger,
            "[SRTP] Protected: SSRC={:#x} Seq={} ROC={} Len={}",
            ssrc,
            seq,
            roc,
            packet.len()
        );

        Ok(())
    }

    /// Authenticate + decrypt an inbound SRTP packet in place, removing the
    /// tag. Replay and auth failures leave the packet untouched.
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.profile.rtp_tag_len();
        if packet.len() < 12 + tag_len {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - tag_len;
        let (content, received_tag) = packet.split_at(tag_start);

        let seq = BigEndian::read_u16(&content[2..4]);
        let ssrc = BigEndian::read_u32(&content[8..12]);

        // Guessed-ROC: try the estimate first, then its neighbours, accepting
        // whichever index authenticates (RFC 3711 §3.3.1).
        let base_roc = self.estimate_roc(ssrc, seq);

        // Cheap pre-check on the estimated index so replays never cost an HMAC.
        let base_index = ((base_roc as u64) << 16) | (seq as u64);
        if let Some(window) = self.replay_windows.get(&ssrc) {
            if window.is_replay(base_index) {
                sink_warn!(
                    self.logger,
                    "[SRTP] Replay detected: SSRC={:#x} Seq={} Index={}",
                    ssrc,
                    seq,
                    base_index
                );
                return Err(SrtpError::Replay);
            }
        }
        let candidates = [base_roc, base_roc.wrapping_add(1), base_roc.wrapping_sub(1)];

        let mut verified_roc = None;
        for roc in candidates {
            let tag = self.rtp_tag(content, roc)?;
            if constant_time_eq(&tag[..tag_len], received_tag) {
                verified_roc = Some(roc);
                break;
            }
        }
        let Some(roc) = verified_roc else {
            sink_error!(
                self.logger,
                "[SRTP] Auth fail: SSRC={:#x} Seq={} ROC~{}",
                ssrc,
                seq,
                base_roc
            );
            return Err(SrtpError::AuthFail);
        };
        let index = ((roc as u64) << 16) | (seq as u64);

        let window = self
            .replay_windows
            .entry(ssrc)
            .or_insert_with(ReplayWindow::new);
        if window.is_replay(index) {
            sink_warn!(
                self.logger,
                "[SRTP] Replay detected: SSRC={:#x} Seq={} Index={}",
                ssrc,
                seq,
                index
            );
            return Err(SrtpError::Replay);
        }
        window.record(index);

        packet.truncate(tag_start);

        if self.profile.cipher_enabled() {
            let header_len = get_rtp_header_len(packet)?;
            let iv = compute_iv(&self.session_keys.salt, ssrc, index);
            let mut cipher = Aes128Ctr::new(&self.session_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[header_len..]);
        }

        // advance highest index
        let advance = match self.last_seqs.get(&ssrc) {
            None => true,
            Some(&last) => {
                let last_roc = self.rocs.get(&ssrc).copied().unwrap_or(0);
                index > (((last_roc as u64) << 16) | (last as u64))
            }
        };
        if advance {
            self.rocs.insert(ssrc, roc);
            self.last_seqs.insert(ssrc, seq);
        }

        Ok(())
    }

    /// Outbound ROC bookkeeping: a large backwards jump in seq means the
    /// 16-bit counter wrapped.
    fn advance_roc(&mut self, ssrc: u32, seq: u16) -> u32 {
        if !self.last_seqs.contains_key(&ssrc) {
            self.last_seqs.insert(ssrc, seq);
            self.rocs.insert(ssrc, 0);
            return 0;
        }

        let last_seq = self.last_seqs.get(&ssrc).copied().unwrap_or(0);
        let mut roc = self.rocs.get(&ssrc).copied().unwrap_or(0);

        if seq < last_seq {
            let diff = (last_seq as u32).wrapping_sub(seq as u32);
            if diff > 0x8000 {
                roc = roc.wrapping_add(1);
            }
        }

        self.last_seqs.insert(ssrc, seq);
        self.rocs.insert(ssrc, roc);
        roc
    }

    fn estimate_roc(&self, ssrc: u32, seq: u16) -> u32 {
        let last_seq = match self.last_seqs.get(&ssrc) {
            Some(&s) => s,
            None => return 0,
        };
        let last_roc = self.rocs.get(&ssrc).copied().unwrap_or(0);

        let delta = (seq as i32) - (last_seq as i32);

        if delta <= -32768 {
            return last_roc.wrapping_add(1);
        }
        if delta >= 32768 {
            return last_roc.wrapping_sub(1);
        }
        last_roc
    }

    /// Full 20-byte HMAC over packet || ROC; callers truncate.
    fn rtp_tag(&self, content: &[u8], roc: u32) -> Result<[u8; 20], SrtpError> {
        let mut mac = HmacSha1::new_from_slice(&self.session_keys.auth_key)
            .map_err(|_| SrtpError::InvalidKey)?;
        mac.update(content);
        let mut roc_bytes = [0u8; 4];
        BigEndian::write_u32(&mut roc_bytes, roc);
        mac.update(&roc_bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoopLogSink;

    fn test_keys() -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: (0u8..16).collect(),
            master_salt: (16u8..30).collect(),
        }
    }

    fn make_rtp(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0u8; 12];
        pkt[0] = 0x80;
        pkt[1] = 96;
        BigEndian::write_u16(&mut pkt[2..4], seq);
        BigEndian::write_u32(&mut pkt[4..8], 1000);
        BigEndian::write_u32(&mut pkt[8..12], ssrc);
        pkt.extend_from_slice(payload);
        pkt
    }

    fn ctx(profile: SrtpProfile) -> SrtpContext {
        SrtpContext::new(Arc::new(NoopLogSink), profile, &test_keys())
    }

    #[test]
    fn protect_unprotect_roundtrip() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);

        let clear = make_rtp(1, 0xDEAD_BEEF, &[0x55; 160]);
        let mut pkt = clear.clone();
        fwd.protect(&mut pkt).unwrap();
        assert_eq!(pkt.len(), clear.len() + 10);
        // payload must differ from plaintext under AES-CM
        assert_ne!(&pkt[12..12 + 160], &clear[12..]);

        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(pkt, clear);
    }

    #[test]
    fn short_tag_profile_roundtrip() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_32);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_32);
        let clear = make_rtp(9, 0xABCD, b"abcdefgh");
        let mut pkt = clear.clone();
        fwd.protect(&mut pkt).unwrap();
        assert_eq!(pkt.len(), clear.len() + 4);
        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(pkt, clear);
    }

    #[test]
    fn null_cipher_leaves_payload_clear_but_authenticates() {
        let mut fwd = ctx(SrtpProfile::NullHmacSha1_80);
        let mut rev = ctx(SrtpProfile::NullHmacSha1_80);
        let clear = make_rtp(3, 0x42, b"plaintext");
        let mut pkt = clear.clone();
        fwd.protect(&mut pkt).unwrap();
        assert_eq!(&pkt[..clear.len()], &clear[..]);

        // tamper -> auth must fail
        let mut bad = pkt.clone();
        bad[13] ^= 0xFF;
        assert_eq!(rev.unprotect(&mut bad).unwrap_err(), SrtpError::AuthFail);

        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(pkt, clear);
    }

    #[test]
    fn tampered_payload_rejected() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut pkt = make_rtp(1, 7, &[1, 2, 3, 4]);
        fwd.protect(&mut pkt).unwrap();
        let n = pkt.len();
        pkt[n - 1] ^= 1;
        assert_eq!(rev.unprotect(&mut pkt).unwrap_err(), SrtpError::AuthFail);
    }

    #[test]
    fn duplicate_packet_rejected_as_replay() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut pkt = make_rtp(50, 7, &[9; 20]);
        fwd.protect(&mut pkt).unwrap();

        let mut first = pkt.clone();
        rev.unprotect(&mut first).unwrap();
        let mut dup = pkt.clone();
        assert_eq!(rev.unprotect(&mut dup).unwrap_err(), SrtpError::Replay);
    }

    #[test]
    fn seq_wrap_advances_roc_on_both_sides() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);

        for seq in [65533u16, 65534, 65535, 0, 1, 2] {
            let clear = make_rtp(seq, 7, &[seq as u8; 8]);
            let mut pkt = clear.clone();
            fwd.protect(&mut pkt).unwrap();
            rev.unprotect(&mut pkt).unwrap();
            assert_eq!(pkt, clear, "seq={seq}");
        }
    }
}
