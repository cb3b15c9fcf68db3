pub(super) type HmacSha1 = Hmac<Sha1>;
pub(super) type Aes128Ctr = Ctr128BE<Aes128>;

use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use ctr::Ctr128BE;
use hmac::Hmac;
use sha1::Sha1;

use crate::srtp::{
    SrtpEndpointKeys,
    constants::{
        LABEL_RTCP_AUTH, LABEL_RTCP_ENCRYPTION, LABEL_RTCP_SALT, LABEL_RTP_AUTH,
        LABEL_RTP_ENCRYPTION, LABEL_RTP_SALT, SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN,
    },
    session_keys::SessionKeys,
};

/// Simple constant-time comparison to avoid timing attacks.
/// (Standard in crypto impls to avoid leaking where the first byte mismatch occurred)
pub(super) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// AES-CM KDF from RFC 3711 §4.3.1, session keys for the RTP direction.
pub(super) fn derive_rtp_session_keys(master: &SrtpEndpointKeys) -> SessionKeys {
    derive_session_keys(master, LABEL_RTP_ENCRYPTION, LABEL_RTP_AUTH, LABEL_RTP_SALT)
}

/// Same KDF with the SRTCP label set (§3.4); the control channel never shares
/// keystream with media.
pub(super) fn derive_rtcp_session_keys(master: &SrtpEndpointKeys) -> SessionKeys {
    derive_session_keys(
        master,
        LABEL_RTCP_ENCRYPTION,
        LABEL_RTCP_AUTH,
        LABEL_RTCP_SALT,
    )
}

fn derive_session_keys(
    master: &SrtpEndpointKeys,
    enc_label: u8,
    auth_label: u8,
    salt_label: u8,
) -> SessionKeys {
    let mut enc_key = [0u8; SESSION_KEY_LEN];
    let mut auth_key = [0u8; SESSION_AUTH_LEN];
    let mut salt = [0u8; SESSION_SALT_LEN];

    let mut salt_pad = [0u8; 16];
    let n = master.master_salt.len().min(SESSION_SALT_LEN);
    salt_pad[..n].copy_from_slice(&master.master_salt[..n]);

    aes_cm_prf(&master.master_key, &salt_pad, enc_label, &mut enc_key);
    aes_cm_prf(&master.master_key, &salt_pad, auth_label, &mut auth_key);
    aes_cm_prf(&master.master_key, &salt_pad, salt_label, &mut salt);

    SessionKeys {
        enc_key,
        auth_key,
        salt,
    }
}

fn aes_cm_prf(master_key: &[u8], master_salt_padded: &[u8; 16], label: u8, out: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv.copy_from_slice(master_salt_padded);
    iv[7] ^= label;

    let mut cipher = Aes128Ctr::new(master_key.into(), &iv.into());
    out.fill(0);
    cipher.apply_keystream(out);
}

/// Per-packet IV for SRTP (RFC 3711 §4.1.1): salt XOR (SSRC || 48-bit index).
pub(super) fn compute_iv(session_salt: &[u8; 14], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..14].copy_from_slice(session_salt);

    let ssrc_bytes = ssrc.to_be_bytes();
    for i in 0..4 {
        iv[4 + i] ^= ssrc_bytes[i];
    }

    let idx_full = index.to_be_bytes();
    for i in 0..6 {
        iv[8 + i] ^= idx_full[2 + i];
    }
    iv
}

/// Per-packet IV for SRTCP: the 31-bit index sits right-aligned in the same
/// 48-bit field the SRTP index occupies.
pub(super) fn compute_rtcp_iv(session_salt: &[u8; 14], ssrc: u32, index: u32) -> [u8; 16] {
    compute_iv(session_salt, ssrc, index as u64)
}

pub(super) fn get_rtp_header_len(packet: &[u8]) -> Result<usize, crate::srtp::SrtpError> {
    use crate::srtp::SrtpError;
    if packet.len() < 12 {
        return Err(SrtpError::TooShort);
    }
    let v_p_x_cc = packet[0];
    let cc = v_p_x_cc & 0x0F;
    let x = (v_p_x_cc & 0x10) != 0;

    let mut len = 12 + (cc as usize * 4);

    if x {
        if packet.len() < len + 4 {
            return Err(SrtpError::BadHeader);
        }
        let ext_len = BigEndian::read_u16(&packet[len + 2..len + 4]);
        len += 4 + (ext_len as usize * 4);
    }

    if packet.len() < len {
        return Err(SrtpError::BadHeader);
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_master() -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: (0u8..16).collect(),
            master_salt: (16u8..30).collect(),
        }
    }

    #[test]
    fn rtp_and_rtcp_keys_differ() {
        let master = test_master();
        let rtp = derive_rtp_session_keys(&master);
        let rtcp = derive_rtcp_session_keys(&master);
        assert_ne!(rtp.enc_key, rtcp.enc_key);
        assert_ne!(rtp.auth_key, rtcp.auth_key);
        assert_ne!(rtp.salt, rtcp.salt);
        assert!(rtp.enc_key.iter().any(|&b| b != 0));
    }

    #[test]
    fn kdf_is_deterministic() {
        let master = test_master();
        let a = derive_rtp_session_keys(&master);
        let b = derive_rtp_session_keys(&master);
        assert_eq!(a.enc_key, b.enc_key);
        assert_eq!(a.auth_key, b.auth_key);
        assert_eq!(a.salt, b.salt);
    }

    #[test]
    fn header_len_with_csrcs_and_extension() {
        // V=2, X=1, CC=2
        let mut pkt = vec![0u8; 12 + 8 + 4 + 8];
        pkt[0] = 0x80 | 0x10 | 0x02;
        // extension length = 2 words, at offset 12+8+2
        pkt[22] = 0;
        pkt[23] = 2;
        assert_eq!(get_rtp_header_len(&pkt).unwrap(), 12 + 8 + 4 + 8);
    }

    #[test]
    fn header_len_rejects_truncated_extension() {
        let mut pkt = vec![0u8; 14];
        pkt[0] = 0x80 | 0x10;
        assert!(get_rtp_header_len(&pkt).is_err());
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
