use std::{
    collections::VecDeque,
    sync::Arc,
};

use crate::{
    dtls::{datagram_channel::DatagramChannel, record},
    log::log_sink::LogSink,
    sink_debug, sink_trace, sink_warn,
    srtp::{SrtcpContext, SrtpContext, SrtpError, SrtpSessionConfig},
    transform::{key_slot::KeySlot, packet_transformer::PacketTransformer, raw_packet::RawPacket},
};

/// How many yield iterations the rtcp-mux control lane spends waiting for the
/// media lane's keys before giving up for this batch.
const MUX_KEY_WAIT_SPINS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Rtp,
    Rtcp,
}

/// Per-lane drop/failure counters, exported for metrics scraping.
#[derive(Debug, Default, Clone)]
pub struct TransformStats {
    pub auth_failures: u64,
    pub replays: u64,
    pub malformed: u64,
    /// Held packets evicted because the pre-key queue overflowed.
    pub held_evicted: u64,
    /// Packets dropped by the drop-unencrypted policy.
    pub policy_dropped: u64,
}

/// The per-lane dispatcher: multiplexes DTLS records and (S)RTP/(S)RTCP on
/// one datagram flow, holding media packets that arrive before the SRTP
/// material is ready.
pub struct DtlsTransformer {
    media_type: MediaType,
    /// DTLS ingress for this lane. The rtcp-mux control lane has none; it
    /// adopts the media lane's keys instead of running a handshake.
    channel: Option<Arc<DatagramChannel>>,
    keys: Arc<KeySlot>,
    srtp_fwd: Option<SrtpContext>,
    srtp_rev: Option<SrtpContext>,
    srtcp_fwd: Option<SrtcpContext>,
    srtcp_rev: Option<SrtcpContext>,
    hold_in: VecDeque<Vec<u8>>,
    hold_out: VecDeque<Vec<u8>>,
    hold_capacity: usize,
    drop_unencrypted: bool,
    closed: bool,
    stats: TransformStats,
    logger: Arc<dyn LogSink>,
}

impl DtlsTransformer {
    pub fn new(
        media_type: MediaType,
        channel: Option<Arc<DatagramChannel>>,
        keys: Arc<KeySlot>,
        hold_capacity: usize,
        drop_unencrypted: bool,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            media_type,
            channel,
            keys,
            srtp_fwd: None,
            srtp_rev: None,
            srtcp_fwd: None,
            srtcp_rev: None,
            hold_in: VecDeque::new(),
            hold_out: VecDeque::new(),
            hold_capacity: hold_capacity.max(1),
            drop_unencrypted,
            closed: false,
            stats: TransformStats::default(),
            logger,
        }
    }

    pub fn stats(&self) -> &TransformStats {
        &self.stats
    }

    pub fn keys_ready(&self) -> bool {
        match self.media_type {
            MediaType::Rtp => self.srtp_fwd.is_some(),
            MediaType::Rtcp => self.srtcp_fwd.is_some(),
        }
    }

    fn build_contexts(&mut self, cfg: &SrtpSessionConfig) {
        match self.media_type {
            MediaType::Rtp => {
                self.srtp_fwd = Some(SrtpContext::new(
                    self.logger.clone(),
                    cfg.profile,
                    &cfg.outbound,
                ));
                self.srtp_rev = Some(SrtpContext::new(
                    self.logger.clone(),
                    cfg.profile,
                    &cfg.inbound,
                ));
            }
            MediaType::Rtcp => {
                self.srtcp_fwd = Some(SrtcpContext::new(
                    self.logger.clone(),
                    cfg.profile,
                    &cfg.outbound,
                ));
                self.srtcp_rev = Some(SrtcpContext::new(
                    self.logger.clone(),
                    cfg.profile,
                    &cfg.inbound,
                ));
            }
        }
        sink_debug!(
            &self.logger,
            "[Transform] {:?} lane keyed with {}",
            self.media_type,
            cfg.profile.name()
        );
    }

    /// Install contexts if the key slot has been published. The control lane
    /// without its own DTLS session briefly spin-yields for the media lane.
    fn ensure_keys(&mut self) -> bool {
        if self.keys_ready() {
            return true;
        }
        let cfg = if self.channel.is_none() {
            self.keys.wait_brief(MUX_KEY_WAIT_SPINS)
        } else {
            self.keys.get()
        };
        match cfg {
            Some(cfg) => {
                self.build_contexts(&cfg);
                true
            }
            None => false,
        }
    }

    fn hold(&mut self, queue_is_inbound: bool, data: Vec<u8>) {
        if self.drop_unencrypted {
            self.stats.policy_dropped += 1;
            return;
        }
        let cap = self.hold_capacity;
        let queue = if queue_is_inbound {
            &mut self.hold_in
        } else {
            &mut self.hold_out
        };
        if queue.len() >= cap {
            queue.pop_front();
            self.stats.held_evicted += 1;
            sink_warn!(
                &self.logger,
                "[Transform] {:?} holding queue full; oldest dropped",
                self.media_type
            );
        }
        queue.push_back(data);
    }

    fn protect_one(&mut self, mut data: Vec<u8>) -> Option<Vec<u8>> {
        let res = match self.media_type {
            MediaType::Rtp => self.srtp_fwd.as_mut()?.protect(&mut data),
            MediaType::Rtcp => self.srtcp_fwd.as_mut()?.protect(&mut data),
        };
        match res {
            Ok(()) => Some(data),
            Err(e) => {
                self.count_error(&e);
                None
            }
        }
    }

    fn unprotect_one(&mut self, mut data: Vec<u8>) -> Option<Vec<u8>> {
        let res = match self.media_type {
            MediaType::Rtp => self.srtp_rev.as_mut()?.unprotect(&mut data),
            MediaType::Rtcp => self.srtcp_rev.as_mut()?.unprotect(&mut data),
        };
        match res {
            Ok(()) => Some(data),
            Err(e) => {
                self.count_error(&e);
                None
            }
        }
    }

    fn count_error(&mut self, e: &SrtpError) {
        match e {
            SrtpError::AuthFail => self.stats.auth_failures += 1,
            SrtpError::Replay => self.stats.replays += 1,
            _ => self.stats.malformed += 1,
        }
    }
}

impl PacketTransformer for DtlsTransformer {
    /// Outbound: protect media once keys exist, else hold (or drop by
    /// policy). Held packets leave first, in arrival order.
    fn transform(&mut self, pkts: Vec<RawPacket>) -> Vec<RawPacket> {
        if self.closed {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(pkts.len());
        for pkt in pkts {
            if !self.ensure_keys() {
                self.hold(false, pkt.into_vec());
                continue;
            }
            if !self.hold_out.is_empty() {
                let held: Vec<Vec<u8>> = self.hold_out.drain(..).collect();
                for data in held {
                    if let Some(done) = self.protect_one(data) {
                        out.push(RawPacket::new(done));
                    }
                }
            }
            if let Some(done) = self.protect_one(pkt.into_vec()) {
                out.push(RawPacket::new(done));
            }
        }
        out
    }

    /// Inbound: DTLS records feed the handshake channel, STUN passes through
    /// untouched, media is decrypted (or held until keys land).
    fn reverse_transform(&mut self, pkts: Vec<RawPacket>) -> Vec<RawPacket> {
        if self.closed {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(pkts.len());
        for pkt in pkts {
            if record::looks_like_dtls(pkt.bytes()) {
                if let Some(channel) = &self.channel {
                    sink_trace!(
                        &self.logger,
                        "[Transform] {:?} lane: DTLS record ({} bytes)",
                        self.media_type,
                        pkt.len()
                    );
                    channel.push_datagram(pkt.bytes());
                }
                // consumed either way; a mux control lane never owns records
                continue;
            }
            if record::looks_like_stun(pkt.bytes()) {
                out.push(pkt);
                continue;
            }
            if !self.ensure_keys() {
                self.hold(true, pkt.into_vec());
                continue;
            }
            if !self.hold_in.is_empty() {
                let held: Vec<Vec<u8>> = self.hold_in.drain(..).collect();
                for data in held {
                    if let Some(done) = self.unprotect_one(data) {
                        out.push(RawPacket::new(done));
                    }
                }
            }
            if let Some(done) = self.unprotect_one(pkt.into_vec()) {
                out.push(RawPacket::new(done));
            }
        }
        out
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.srtp_fwd = None;
        self.srtp_rev = None;
        self.srtcp_fwd = None;
        self.srtcp_rev = None;
        self.hold_in.clear();
        self.hold_out.clear();
        if let Some(channel) = &self.channel {
            channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtls::datagram_channel::DatagramSink;
    use crate::log::NoopLogSink;
    use crate::srtp::{SrtpEndpointKeys, SrtpProfile};
    use byteorder::{BigEndian, ByteOrder};
    use std::io;
    use std::time::Duration;

    struct NullSink;
    impl DatagramSink for NullSink {
        fn send_datagram(&self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn logger() -> Arc<NoopLogSink> {
        Arc::new(NoopLogSink)
    }

    fn session_cfg() -> SrtpSessionConfig {
        SrtpSessionConfig {
            profile: SrtpProfile::Aes128CmHmacSha1_80,
            outbound: SrtpEndpointKeys {
                master_key: (0u8..16).collect(),
                master_salt: (16u8..30).collect(),
            },
            inbound: SrtpEndpointKeys {
                master_key: (50u8..66).collect(),
                master_salt: (66u8..80).collect(),
            },
        }
    }

    fn mirrored(cfg: &SrtpSessionConfig) -> SrtpSessionConfig {
        SrtpSessionConfig {
            profile: cfg.profile,
            outbound: cfg.inbound.clone(),
            inbound: cfg.outbound.clone(),
        }
    }

    fn make_rtp(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0u8; 12];
        pkt[0] = 0x80;
        pkt[1] = 96;
        BigEndian::write_u16(&mut pkt[2..4], seq);
        BigEndian::write_u32(&mut pkt[4..8], 0);
        BigEndian::write_u32(&mut pkt[8..12], ssrc);
        pkt.extend_from_slice(payload);
        pkt
    }

    fn make_channel() -> Arc<DatagramChannel> {
        Arc::new(DatagramChannel::new(8, 1280, Arc::new(NullSink), logger()))
    }

    fn rtp_lane(
        channel: Option<Arc<DatagramChannel>>,
        keys: Arc<KeySlot>,
        drop_unencrypted: bool,
    ) -> DtlsTransformer {
        DtlsTransformer::new(MediaType::Rtp, channel, keys, 4, drop_unencrypted, logger())
    }

    #[test]
    fn dtls_records_feed_the_channel() {
        let channel = make_channel();
        let keys = Arc::new(KeySlot::default());
        let mut lane = rtp_lane(Some(channel.clone()), keys, false);

        let mut dtls = vec![22u8, 0xFE, 0xFD];
        dtls.extend_from_slice(&[0u8; 8]);
        dtls.extend_from_slice(&3u16.to_be_bytes());
        dtls.extend_from_slice(&[1, 0, 0]);

        let out = lane.reverse_transform(vec![RawPacket::new(dtls.clone())]);
        assert!(out.is_empty(), "record consumed");

        let mut buf = [0u8; 64];
        let n = channel.receive(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], &dtls[..]);
    }

    #[test]
    fn stun_passes_through_untouched() {
        let keys = Arc::new(KeySlot::default());
        let mut lane = rtp_lane(Some(make_channel()), keys, false);
        let stun = vec![0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        let out = lane.reverse_transform(vec![RawPacket::new(stun.clone())]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes(), &stun[..]);
    }

    #[test]
    fn pre_key_packets_held_then_flushed_in_order() {
        let keys = Arc::new(KeySlot::default());
        let mut tx = rtp_lane(Some(make_channel()), keys.clone(), false);

        let early1 = make_rtp(1, 7, b"one");
        let early2 = make_rtp(2, 7, b"two");
        assert!(tx.transform(vec![RawPacket::new(early1)]).is_empty());
        assert!(tx.transform(vec![RawPacket::new(early2)]).is_empty());

        let cfg = session_cfg();
        keys.publish(cfg.clone());

        let now = make_rtp(3, 7, b"three");
        let out = tx.transform(vec![RawPacket::new(now)]);
        assert_eq!(out.len(), 3, "held packets flushed first plus the new one");

        // decrypt on a mirrored receive lane and check ordering
        let rx_keys = Arc::new(KeySlot::default());
        rx_keys.publish(mirrored(&cfg));
        let mut rx = rtp_lane(Some(make_channel()), rx_keys, false);
        let clear = rx.reverse_transform(out);
        assert_eq!(clear.len(), 3);
        let seqs: Vec<u16> = clear
            .iter()
            .map(|p| BigEndian::read_u16(&p.bytes()[2..4]))
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn holding_queue_drops_oldest_on_overflow() {
        let keys = Arc::new(KeySlot::default());
        let mut tx = rtp_lane(Some(make_channel()), keys.clone(), false);
        for seq in 0u16..6 {
            let _ = tx.transform(vec![RawPacket::new(make_rtp(seq, 7, b"x"))]);
        }
        assert_eq!(tx.stats().held_evicted, 2);

        keys.publish(session_cfg());
        let out = tx.transform(vec![RawPacket::new(make_rtp(6, 7, b"x"))]);
        // capacity 4 survivors + the new packet
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn drop_unencrypted_policy_drops_silently() {
        let keys = Arc::new(KeySlot::default());
        let mut lane = rtp_lane(Some(make_channel()), keys, true);
        let out = lane.reverse_transform(vec![RawPacket::new(make_rtp(1, 7, b"x"))]);
        assert!(out.is_empty());
        assert_eq!(lane.stats().policy_dropped, 1);
    }

    #[test]
    fn inbound_auth_failure_counted_and_dropped() {
        let keys = Arc::new(KeySlot::default());
        keys.publish(session_cfg());
        let mut lane = rtp_lane(Some(make_channel()), keys, false);
        // garbage that parses as RTP but cannot authenticate
        let mut fake = make_rtp(1, 7, &[0u8; 32]);
        fake.extend_from_slice(&[0u8; 10]);
        let out = lane.reverse_transform(vec![RawPacket::new(fake)]);
        assert!(out.is_empty());
        assert_eq!(lane.stats().auth_failures, 1);
    }

    #[test]
    fn mux_control_lane_adopts_media_keys() {
        let shared = Arc::new(KeySlot::default());
        let cfg = session_cfg();
        shared.publish(cfg.clone());

        // control lane has no channel of its own
        let mut tx =
            DtlsTransformer::new(MediaType::Rtcp, None, shared.clone(), 4, false, logger());

        let mut rr = vec![0x80, 201, 0, 1];
        rr.extend_from_slice(&0xAABBu32.to_be_bytes());
        let out = tx.transform(vec![RawPacket::new(rr.clone())]);
        assert_eq!(out.len(), 1);
        assert!(out[0].len() > rr.len());

        let rx_keys = Arc::new(KeySlot::default());
        rx_keys.publish(mirrored(&cfg));
        let mut rx = DtlsTransformer::new(MediaType::Rtcp, None, rx_keys, 4, false, logger());
        let clear = rx.reverse_transform(out);
        assert_eq!(clear.len(), 1);
        assert_eq!(clear[0].bytes(), &rr[..]);
    }

    #[test]
    fn closed_lane_drops_everything() {
        let keys = Arc::new(KeySlot::default());
        keys.publish(session_cfg());
        let mut lane = rtp_lane(Some(make_channel()), keys, false);
        lane.close();
        assert!(lane.transform(vec![RawPacket::new(make_rtp(1, 7, b"x"))]).is_empty());
        assert!(
            lane.reverse_transform(vec![RawPacket::new(make_rtp(1, 7, b"x"))])
                .is_empty()
        );
    }
}
