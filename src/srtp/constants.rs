// SRTP key derivation labels (RFC 3711 §4.3.1)
pub const LABEL_RTP_ENCRYPTION: u8 = 0x00;
pub const LABEL_RTP_AUTH: u8 = 0x01;
pub const LABEL_RTP_SALT: u8 = 0x02;
// SRTCP labels (RFC 3711 §3.4)
pub const LABEL_RTCP_ENCRYPTION: u8 = 0x03;
pub const LABEL_RTCP_AUTH: u8 = 0x04;
pub const LABEL_RTCP_SALT: u8 = 0x05;

pub const SESSION_KEY_LEN: usize = 16; // 128 bits
pub const SESSION_AUTH_LEN: usize = 20; // 160 bits (SHA1)
pub const SESSION_SALT_LEN: usize = 14; // 112 bits

// Replay protection window size (64 packets)
pub const REPLAY_WINDOW_SIZE: u64 = 64;

// SRTCP trailer: 1-bit E flag + 31-bit packet index
pub const SRTCP_INDEX_LEN: usize = 4;
pub const SRTCP_E_FLAG: u32 = 0x8000_0000;
pub const SRTCP_INDEX_MASK: u32 = 0x7FFF_FFFF;
