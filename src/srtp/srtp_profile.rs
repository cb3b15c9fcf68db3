use crate::srtp::constants::{SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN};
use crate::srtp::srtp_error::SrtpError;

/// SRTP protection profiles negotiable through the DTLS use_srtp extension
/// (RFC 5764 §4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProfile {
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
    NullHmacSha1_80,
    NullHmacSha1_32,
}

impl SrtpProfile {
    /// Wire name as carried in the extension and reported by openssl.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SrtpProfile::Aes128CmHmacSha1_80 => "SRTP_AES128_CM_SHA1_80",
            SrtpProfile::Aes128CmHmacSha1_32 => "SRTP_AES128_CM_SHA1_32",
            SrtpProfile::NullHmacSha1_80 => "SRTP_NULL_SHA1_80",
            SrtpProfile::NullHmacSha1_32 => "SRTP_NULL_SHA1_32",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SrtpError> {
        match name {
            "SRTP_AES128_CM_SHA1_80" => Ok(SrtpProfile::Aes128CmHmacSha1_80),
            "SRTP_AES128_CM_SHA1_32" => Ok(SrtpProfile::Aes128CmHmacSha1_32),
            "SRTP_NULL_SHA1_80" | "SRTP_NULL_HMAC_SHA1_80" => Ok(SrtpProfile::NullHmacSha1_80),
            "SRTP_NULL_SHA1_32" | "SRTP_NULL_HMAC_SHA1_32" => Ok(SrtpProfile::NullHmacSha1_32),
            other => Err(SrtpError::UnknownProfile(other.to_string())),
        }
    }

    /// Parse a colon-separated profile list (configuration syntax, same as the
    /// string handed to openssl).
    pub fn parse_list(list: &str) -> Result<Vec<Self>, SrtpError> {
        list.split(':')
            .filter(|s| !s.is_empty())
            .map(Self::from_name)
            .collect()
    }

    /// Join profiles into the colon-separated form set_tlsext_use_srtp expects.
    #[must_use]
    pub fn offer_string(profiles: &[Self]) -> String {
        profiles
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(":")
    }

    #[must_use]
    pub fn master_key_len(self) -> usize {
        SESSION_KEY_LEN
    }

    #[must_use]
    pub fn master_salt_len(self) -> usize {
        SESSION_SALT_LEN
    }

    #[must_use]
    pub fn auth_key_len(self) -> usize {
        SESSION_AUTH_LEN
    }

    /// Whether the AES-CM cipher is applied (false for the NULL profiles,
    /// which still authenticate).
    #[must_use]
    pub fn cipher_enabled(self) -> bool {
        matches!(
            self,
            SrtpProfile::Aes128CmHmacSha1_80 | SrtpProfile::Aes128CmHmacSha1_32
        )
    }

    /// Truncated HMAC length appended to RTP packets.
    #[must_use]
    pub fn rtp_tag_len(self) -> usize {
        match self {
            SrtpProfile::Aes128CmHmacSha1_80 | SrtpProfile::NullHmacSha1_80 => 10,
            SrtpProfile::Aes128CmHmacSha1_32 | SrtpProfile::NullHmacSha1_32 => 4,
        }
    }

    /// Truncated HMAC length appended to RTCP packets (the _32 profiles keep
    /// the full 80-bit tag on the control channel).
    #[must_use]
    pub fn rtcp_tag_len(self) -> usize {
        10
    }
}

/// RFC 5764 server-side selection: the first profile of the peer's offer that
/// is also configured locally. Returns `None` on an empty intersection, which
/// the caller must turn into a fatal alert.
#[must_use]
pub fn negotiate(offered: &[SrtpProfile], local: &[SrtpProfile]) -> Option<SrtpProfile> {
    offered.iter().copied().find(|p| local.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_follows_offer_order() {
        let offered = [
            SrtpProfile::Aes128CmHmacSha1_80,
            SrtpProfile::Aes128CmHmacSha1_32,
        ];
        let local = [
            SrtpProfile::Aes128CmHmacSha1_32,
            SrtpProfile::Aes128CmHmacSha1_80,
        ];
        assert_eq!(
            negotiate(&offered, &local),
            Some(SrtpProfile::Aes128CmHmacSha1_80)
        );
    }

    #[test]
    fn empty_intersection_is_none() {
        let offered = [SrtpProfile::NullHmacSha1_80];
        let local = [SrtpProfile::Aes128CmHmacSha1_80];
        assert_eq!(negotiate(&offered, &local), None);
    }

    #[test]
    fn name_roundtrip() {
        for p in [
            SrtpProfile::Aes128CmHmacSha1_80,
            SrtpProfile::Aes128CmHmacSha1_32,
            SrtpProfile::NullHmacSha1_80,
            SrtpProfile::NullHmacSha1_32,
        ] {
            assert_eq!(SrtpProfile::from_name(p.name()).unwrap(), p);
        }
    }

    #[test]
    fn parse_list_and_offer_string() {
        let list = "SRTP_AES128_CM_SHA1_80:SRTP_AES128_CM_SHA1_32";
        let profiles = SrtpProfile::parse_list(list).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(SrtpProfile::offer_string(&profiles), list);
    }

    #[test]
    fn tag_lengths_per_profile() {
        assert_eq!(SrtpProfile::Aes128CmHmacSha1_80.rtp_tag_len(), 10);
        assert_eq!(SrtpProfile::Aes128CmHmacSha1_32.rtp_tag_len(), 4);
        assert_eq!(SrtpProfile::Aes128CmHmacSha1_32.rtcp_tag_len(), 10);
        assert!(!SrtpProfile::NullHmacSha1_32.cipher_enabled());
    }
}
