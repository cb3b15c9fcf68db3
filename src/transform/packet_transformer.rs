use crate::transform::raw_packet::RawPacket;

/// Bidirectional batch transformer, the single entry point the RTP stack
/// drives for a lane.
///
/// `transform` runs on the outbound path (plain → wire form) and
/// `reverse_transform` on the inbound path. Packets a stage consumes (DTLS
/// records, dropped SRTP) simply do not appear in the returned batch; packets
/// it cannot handle yet may be emitted on a later call once keys arrive.
pub trait PacketTransformer: Send {
    fn transform(&mut self, pkts: Vec<RawPacket>) -> Vec<RawPacket>;

    fn reverse_transform(&mut self, pkts: Vec<RawPacket>) -> Vec<RawPacket>;

    /// Release per-lane resources; subsequent calls drop everything.
    fn close(&mut self);
}
