//! Bit-exact RTCP compound codec (RFC3550 + RFC4585/5104 feedback + REMB).

pub mod app;
pub mod bye;
pub mod common_header;
pub mod full_intra_request;
pub mod generic_nack;
pub mod packet_type;
pub mod picture_loss;
pub mod receiver_report;
pub mod remb;
pub mod report_block;
pub mod rtcp;
pub mod rtcp_error;
pub mod sdes;
pub mod sender_info;
pub mod sender_report;

pub use rtcp::{CompoundParse, RtcpPacket};
pub use rtcp_error::RtcpError;
