use crate::log::log_sink::LogSink;
use crate::srtp::constants::{SRTCP_E_FLAG, SRTCP_INDEX_LEN, SRTCP_INDEX_MASK};
use crate::srtp::replay_window::ReplayWindow;
use crate::srtp::session_keys::SessionKeys;
use crate::srtp::srtp_error::SrtpError;
use crate::srtp::utils::{
    Aes128Ctr, HmacSha1, compute_rtcp_iv, constant_time_eq, derive_rtcp_session_keys,
};
use crate::srtp::{SrtpEndpointKeys, SrtpProfile};
use crate::{sink_trace, sink_warn};
use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use hmac::Mac;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed part of an RTCP packet that stays in the clear: header word + SSRC.
const RTCP_CLEAR_PREFIX: usize = 8;

/// One direction of SRTCP (RFC 3711 §3.4).
///
/// The control channel runs an independent 31-bit packet index carried in
/// the clear behind the payload, with its own replay window per sender SSRC.
pub struct SrtcpContext {
    logger: Arc<dyn LogSink>,
    profile: SrtpProfile,
    session_keys: SessionKeys,
    /// Outbound packet index, pre-increment.
    next_index: u32,
    /// Inbound replay windows keyed by sender SSRC.
    replay_windows: HashMap<u32, ReplayWindow>,
}

impl SrtcpContext {
    pub fn new(
        logger: Arc<dyn LogSink>,
        profile: SrtpProfile,
        master_keys: &SrtpEndpointKeys,
    ) -> Self {
        let session_keys = derive_rtcp_session_keys(master_keys);
        Self {
            logger,
            profile,
            session_keys,
            next_index: 0,
            replay_windows: HashMap::new(),
        }
    }

    pub fn profile(&self) -> SrtpProfile {
        self.profile
    }

    /// Encrypt + authenticate an outbound compound RTCP packet in place,
    /// appending E-flag||index and the tag.
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < RTCP_CLEAR_PREFIX {
            return Err(SrtpError::TooShort);
        }
        let ssrc = BigEndian::read_u32(&packet[4..8]);
        let index = self.next_index;
        self.next_index = index.wrapping_add(1) & SRTCP_INDEX_MASK;

        let encrypted = self.profile.cipher_enabled();
        if encrypted && packet.len() > RTCP_CLEAR_PREFIX {
            let iv = compute_rtcp_iv(&self.session_keys.salt, ssrc, index);
            let mut cipher = Aes128Ctr::new(&self.session_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[RTCP_CLEAR_PREFIX..]);
        }

        let e_index = if encrypted {
            SRTCP_E_FLAG | index
        } else {
            index
        };
        packet.extend_from_slice(&e_index.to_be_bytes());

        let tag = self.rtcp_tag(packet)?;
        let tag_len = self.profile.rtcp_tag_len();
        packet.extend_from_slice(&tag[..tag_len]);

        sink_trace!(
            self.logger,
            "[SRTCP] Protected: SSRC={:#x} Index={} Len={}",
            ssrc,
            index,
            packet.len()
        );
        Ok(())
    }

    /// Authenticate + decrypt an inbound SRTCP packet in place, removing the
    /// index word and tag.
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.profile.rtcp_tag_len();
        if packet.len() < RTCP_CLEAR_PREFIX + SRTCP_INDEX_LEN + tag_len {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - tag_len;
        let (content, received_tag) = packet.split_at(tag_start);

        let ei_offset = tag_start - SRTCP_INDEX_LEN;
        let e_index = BigEndian::read_u32(&content[ei_offset..]);
        let encrypted = (e_index & SRTCP_E_FLAG) != 0;
        let index = e_index & SRTCP_INDEX_MASK;
        let ssrc = BigEndian::read_u32(&content[4..8]);

        let window = self
            .replay_windows
            .entry(ssrc)
            .or_insert_with(ReplayWindow::new);
        if window.is_replay(index as u64) {
            sink_warn!(
                self.logger,
                "[SRTCP] Replay detected: SSRC={:#x} Index={}",
                ssrc,
                index
            );
            return Err(SrtpError::Replay);
        }

        let mut mac = HmacSha1::new_from_slice(&self.session_keys.auth_key)
            .map_err(|_| SrtpError::InvalidKey)?;
        mac.update(content);
        let full = mac.finalize().into_bytes();
        if !constant_time_eq(&full[..tag_len], received_tag) {
            sink_warn!(
                self.logger,
                "[SRTCP] Auth fail: SSRC={:#x} Index={}",
                ssrc,
                index
            );
            return Err(SrtpError::AuthFail);
        }

        // trusted now; strip trailer and decrypt
        packet.truncate(ei_offset);
        if encrypted && packet.len() > RTCP_CLEAR_PREFIX {
            let iv = compute_rtcp_iv(&self.session_keys.salt, ssrc, index);
            let mut cipher = Aes128Ctr::new(&self.session_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[RTCP_CLEAR_PREFIX..]);
        }

        if let Some(window) = self.replay_windows.get_mut(&ssrc) {
            window.record(index as u64);
        }
        Ok(())
    }

    /// Full HMAC over header || payload || E-flag || index.
    fn rtcp_tag(&self, content: &[u8]) -> Result<[u8; 20], SrtpError> {
        let mut mac = HmacSha1::new_from_slice(&self.session_keys.auth_key)
            .map_err(|_| SrtpError::InvalidKey)?;
        mac.update(content);
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
            master_key: (100u8..116).collect(),
            master_salt: (116u8..130).collect(),
        }
    }

    fn make_rr(ssrc: u32) -> Vec<u8> {
        let mut pkt = vec![0x80, 201, 0, 1];
        pkt.extend_from_slice(&ssrc.to_be_bytes());
        pkt
    }

    fn ctx(profile: SrtpProfile) -> SrtcpContext {
        SrtcpContext::new(Arc::new(NoopLogSink), profile, &test_keys())
    }

    #[test]
    fn roundtrip_with_e_flag() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);

        let clear = make_rr(0xCAFE_BABE);
        let mut pkt = clear.clone();
        fwd.protect(&mut pkt).unwrap();
        assert_eq!(pkt.len(), clear.len() + 4 + 10);
        // header word + SSRC stay in the clear
        assert_eq!(&pkt[..8], &clear[..8]);
        // E flag set for an encrypting profile
        let e_index = BigEndian::read_u32(&pkt[pkt.len() - 14..pkt.len() - 10]);
        assert_ne!(e_index & SRTCP_E_FLAG, 0);
        assert_eq!(e_index & SRTCP_INDEX_MASK, 0);

        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(pkt, clear);
    }

    #[test]
    fn null_profile_clears_e_flag() {
        let mut fwd = ctx(SrtpProfile::NullHmacSha1_80);
        let mut rev = ctx(SrtpProfile::NullHmacSha1_80);

        let clear = make_rr(0x1234);
        let mut pkt = clear.clone();
        fwd.protect(&mut pkt).unwrap();
        let e_index = BigEndian::read_u32(&pkt[pkt.len() - 14..pkt.len() - 10]);
        assert_eq!(e_index & SRTCP_E_FLAG, 0);
        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(pkt, clear);
    }

    #[test]
    fn index_advances_per_packet() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        for i in 0u32..4 {
            let clear = make_rr(0x7777);
            let mut pkt = clear.clone();
            fwd.protect(&mut pkt).unwrap();
            let e_index = BigEndian::read_u32(&pkt[pkt.len() - 14..pkt.len() - 10]);
            assert_eq!(e_index & SRTCP_INDEX_MASK, i);
            rev.unprotect(&mut pkt).unwrap();
            assert_eq!(pkt, clear);
        }
    }

    #[test]
    fn duplicate_index_rejected() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut pkt = make_rr(0x7777);
        fwd.protect(&mut pkt).unwrap();
        let mut dup = pkt.clone();
        rev.unprotect(&mut pkt).unwrap();
        assert_eq!(rev.unprotect(&mut dup).unwrap_err(), SrtpError::Replay);
    }

    #[test]
    fn tampered_packet_rejected() {
        let mut fwd = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut rev = ctx(SrtpProfile::Aes128CmHmacSha1_80);
        let mut pkt = make_rr(0x7777);
        fwd.protect(&mut pkt).unwrap();
        pkt[5] ^= 0x01;
        assert_eq!(rev.unprotect(&mut pkt).unwrap_err(), SrtpError::AuthFail);
    }
}
