//! RTP-side bookkeeping: sequence extension, clock conversions, and the
//! per-SSRC receive/send statistics behind RTCP report generation.

pub mod header;
pub mod receive_stats;
pub mod send_stats;
pub mod seq;
pub mod time;

pub use receive_stats::{ReceiveStats, ReceiveStatsMap};
pub use send_stats::{SendStats, SendStatsMap};
