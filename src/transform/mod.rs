//! The packet transformer: one entry point per lane that multiplexes DTLS
//! and (S)RTP/(S)RTCP over a single datagram flow.

pub mod dtls_transformer;
pub mod key_slot;
pub mod packet_transformer;
pub mod raw_packet;

pub use dtls_transformer::{DtlsTransformer, MediaType, TransformStats};
pub use key_slot::KeySlot;
pub use packet_transformer::PacketTransformer;
pub use raw_packet::RawPacket;
