use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, rngs::OsRng};

use crate::{
    config::Config,
    dtls::{
        DatagramChannel, DatagramSink, DtlsError, DtlsSession, DtlsSessionState, HandshakeParams,
        Setup,
        certificate::obtain_certificate,
    },
    log::log_sink::LogSink,
    rtcp::{RtcpPacket, sdes::SdesItem},
    rtp::{
        header::RtpHeaderView,
        receive_stats::ReceiveStatsMap,
        send_stats::SendStatsMap,
        time::now_millis,
    },
    sink_debug, sink_info, sink_warn,
    srtp::SrtpProfile,
    termination::{
        BandwidthEstimator, CnameRegistry, FeedbackCache, PacketInjector, RemoteClockEstimator,
        ReportBuilder, Reporter, RtcpGateway, TerminationMode,
    },
    transform::{DtlsTransformer, KeySlot, MediaType, PacketTransformer, RawPacket, TransformStats},
};

/// Per-receive wait inside one handshake attempt; the retry budget in
/// [`crate::dtls::session`] bounds the whole exchange.
const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What signaling agreed on before media can flow.
#[derive(Debug, Clone)]
pub struct SignalingParams {
    pub setup: Setup,
    /// hash-function name (lower case) → RFC 4572 fingerprint string.
    pub remote_fingerprints: HashMap<String, String>,
    pub rtcp_mux: bool,
}

/// The fingerprint the embedder publishes over signaling.
#[derive(Debug, Clone)]
pub struct LocalFingerprint {
    pub hash_name: &'static str,
    pub fingerprint: String,
}

/// One media stream's security and RTCP-termination core: the DTLS-SRTP
/// transport adapter on both lanes plus the termination engine.
///
/// The embedder owns sockets and demultiplexing: inbound datagrams go to
/// [`MediaSession::receive_rtp`] / [`MediaSession::receive_rtcp`], outbound
/// media through [`MediaSession::send_rtp`]. Synthesized RTCP leaves through
/// the RTCP sink on its own.
pub struct MediaSession {
    logger: Arc<dyn LogSink>,
    local_ssrc: u32,
    signaling: SignalingParams,
    profiles: Vec<SrtpProfile>,
    verify_fingerprints: bool,
    local_fingerprint: LocalFingerprint,

    rtp_dtls: Arc<DtlsSession>,
    rtcp_dtls: Option<Arc<DtlsSession>>,
    rtp_keys: Arc<KeySlot>,
    rtcp_keys: Arc<KeySlot>,

    rtp_transformer: Mutex<DtlsTransformer>,
    rtcp_transformer: Arc<Mutex<DtlsTransformer>>,
    rtcp_sink: Arc<dyn DatagramSink>,

    gateway: RtcpGateway,
    reporter: Reporter,
    receive_stats: Arc<Mutex<ReceiveStatsMap>>,
    send_stats: Arc<Mutex<SendStatsMap>>,
    clocks: Arc<RemoteClockEstimator>,

    closed: AtomicBool,
}

impl MediaSession {
    pub fn new(
        config: Arc<Config>,
        signaling: SignalingParams,
        mode: TerminationMode,
        rtp_sink: Arc<dyn DatagramSink>,
        rtcp_sink: Arc<dyn DatagramSink>,
        estimator: Option<Arc<dyn BandwidthEstimator>>,
        logger: Arc<dyn LogSink>,
    ) -> Result<Arc<Self>, DtlsError> {
        let identity = obtain_certificate(&config)?;
        let local_fingerprint = LocalFingerprint {
            hash_name: identity.hash_name,
            fingerprint: identity.fingerprint.clone(),
        };

        let profiles = SrtpProfile::parse_list(config.srtp_profiles())
            .map_err(|e| DtlsError::Handshake(format!("bad srtp_profiles: {e}")))?;

        let rtp_keys = Arc::new(KeySlot::default());
        let rtcp_keys = if signaling.rtcp_mux {
            rtp_keys.clone()
        } else {
            Arc::new(KeySlot::default())
        };

        let queue_capacity = config.dtls_queue_capacity();
        let mtu = config.mtu();
        let hold_capacity = config.holding_queue_capacity();
        let drop_unencrypted = config.drop_unencrypted_pkts();

        let rtp_channel = Arc::new(DatagramChannel::new(
            queue_capacity,
            mtu,
            rtp_sink,
            logger.clone(),
        ));
        let rtp_dtls = DtlsSession::new(rtp_channel.clone(), config.clone(), logger.clone());

        let (rtcp_channel, rtcp_dtls) = if signaling.rtcp_mux {
            (None, None)
        } else {
            let channel = Arc::new(DatagramChannel::new(
                queue_capacity,
                mtu,
                rtcp_sink.clone(),
                logger.clone(),
            ));
            let session = DtlsSession::new(channel.clone(), config.clone(), logger.clone());
            (Some(channel), Some(session))
        };

        let rtp_transformer = Mutex::new(DtlsTransformer::new(
            MediaType::Rtp,
            Some(rtp_channel),
            rtp_keys.clone(),
            hold_capacity,
            drop_unencrypted,
            logger.clone(),
        ));
        let rtcp_transformer = Arc::new(Mutex::new(DtlsTransformer::new(
            MediaType::Rtcp,
            rtcp_channel,
            rtcp_keys.clone(),
            hold_capacity,
            drop_unencrypted,
            logger.clone(),
        )));

        let feedback = Arc::new(FeedbackCache::default());
        let clocks = Arc::new(RemoteClockEstimator::default());
        let cnames = Arc::new(CnameRegistry::default());
        let receive_stats = Arc::new(Mutex::new(ReceiveStatsMap::default()));
        let send_stats = Arc::new(Mutex::new(SendStatsMap::default()));

        let gateway = RtcpGateway::new(
            mode,
            feedback.clone(),
            clocks.clone(),
            cnames.clone(),
            logger.clone(),
        );

        let local_ssrc = OsRng.next_u32();
        let own_cname = config
            .get_non_empty_or_default("RTCP", "cname", "rustysfu@bridge")
            .as_bytes()
            .to_vec();
        let own_items = vec![SdesItem::Tool(
            format!("rustysfu/{}", env!("CARGO_PKG_VERSION")).into_bytes(),
        )];

        let builder = ReportBuilder::new(
            mode,
            local_ssrc,
            own_cname,
            own_items,
            mtu,
            feedback,
            clocks.clone(),
            cnames,
            receive_stats.clone(),
            send_stats.clone(),
            estimator,
            logger.clone(),
        );
        let reporter = Reporter::new(config.rtcp_interval_ms(), builder, logger.clone());

        let verify_fingerprints = config.verify_and_validate_certificate();

        Ok(Arc::new(Self {
            logger,
            local_ssrc,
            signaling,
            profiles,
            verify_fingerprints,
            local_fingerprint,
            rtp_dtls,
            rtcp_dtls,
            rtp_keys,
            rtcp_keys,
            rtp_transformer,
            rtcp_transformer,
            rtcp_sink,
            gateway,
            reporter,
            receive_stats,
            send_stats,
            clocks,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn local_fingerprint(&self) -> &LocalFingerprint {
        &self.local_fingerprint
    }

    pub fn local_ssrc(&self) -> u32 {
        self.local_ssrc
    }

    pub fn dtls_state(&self) -> DtlsSessionState {
        self.rtp_dtls.state()
    }

    pub fn rtp_stats(&self) -> TransformStats {
        self.rtp_transformer
            .lock()
            .map(|t| t.stats().clone())
            .unwrap_or_default()
    }

    pub fn rtcp_stats(&self) -> TransformStats {
        self.rtcp_transformer
            .lock()
            .map(|t| t.stats().clone())
            .unwrap_or_default()
    }

    fn handshake_params(&self) -> HandshakeParams {
        HandshakeParams {
            role: self.signaling.setup.role(),
            profiles: self.profiles.clone(),
            remote_fingerprints: Arc::new(self.signaling.remote_fingerprints.clone()),
            verify_fingerprints: self.verify_fingerprints,
            read_timeout: HANDSHAKE_READ_TIMEOUT,
        }
    }

    /// Kick off the DTLS handshake worker(s). With rtcp-mux the control lane
    /// never handshakes; it adopts the media lane's keys.
    pub fn start(&self) {
        let params = self.handshake_params();
        let keys = self.rtp_keys.clone();
        self.rtp_dtls
            .clone()
            .start(params.clone(), Box::new(move |cfg| keys.publish(cfg)));
        if let Some(rtcp_dtls) = &self.rtcp_dtls {
            let keys = self.rtcp_keys.clone();
            rtcp_dtls
                .clone()
                .start(params, Box::new(move |cfg| keys.publish(cfg)));
        }
        sink_info!(
            &self.logger,
            "[Session] Started (role {:?}, rtcp-mux {})",
            self.signaling.setup.role(),
            self.signaling.rtcp_mux
        );
    }

    /// Outbound media: account, maybe fire the reporter, protect.
    pub fn send_rtp(&self, pkts: Vec<RawPacket>, now_ms: i64) -> Vec<RawPacket> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        if let Ok(mut stats) = self.send_stats.lock() {
            for pkt in &pkts {
                if let Some(h) = RtpHeaderView::parse(pkt.bytes()) {
                    stats
                        .entry(h.ssrc)
                        .on_sent(h.payload_len(pkt.bytes()), h.timestamp, now_ms);
                }
            }
        }

        let injector = RtcpInjector {
            transformer: self.rtcp_transformer.clone(),
            sink: self.rtcp_sink.clone(),
        };
        self.reporter.maybe_report(now_ms, &injector);

        self.rtp_transformer
            .lock()
            .map(|mut t| t.transform(pkts))
            .unwrap_or_default()
    }

    /// Inbound media-lane datagrams: DTLS records are consumed, SRTP is
    /// decrypted and accounted, STUN passes through.
    pub fn receive_rtp(&self, pkts: Vec<RawPacket>, now_ms: i64) -> Vec<RawPacket> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let clear = self
            .rtp_transformer
            .lock()
            .map(|mut t| t.reverse_transform(pkts))
            .unwrap_or_default();

        if let Ok(mut stats) = self.receive_stats.lock() {
            for pkt in &clear {
                if let Some(h) = RtpHeaderView::parse(pkt.bytes()) {
                    let arrival_units = self.arrival_rtp_units(h.ssrc, h.timestamp, now_ms);
                    stats
                        .entry(h.ssrc)
                        .on_rtp(h.sequence_number, h.timestamp, arrival_units, now_ms);
                }
            }
        }
        clear
    }

    /// Inbound control-lane datagrams: decrypt, harvest, filter; what comes
    /// back is what the bridge forwards to the other conference legs.
    pub fn receive_rtcp(&self, pkts: Vec<RawPacket>, now_ms: i64) -> Vec<RawPacket> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let clear = self
            .rtcp_transformer
            .lock()
            .map(|mut t| t.reverse_transform(pkts))
            .unwrap_or_default();

        let mut out = Vec::new();
        for pkt in clear {
            let parse = RtcpPacket::decode_compound_tolerant(pkt.bytes());
            if parse.dropped > 0 {
                sink_warn!(
                    &self.logger,
                    "[Session] {} malformed RTCP record(s) dropped",
                    parse.dropped
                );
            }
            if parse.packets.is_empty() {
                continue;
            }
            // LSR/DLSR bookkeeping wants the SR before the gateway filters it
            if let Ok(mut stats) = self.receive_stats.lock() {
                for p in &parse.packets {
                    if let RtcpPacket::Sr(sr) = p {
                        if let Some(s) = stats.get_mut(sr.ssrc) {
                            s.on_sr(sr.info.ntp_timestamp(), now_ms);
                        }
                    }
                }
            }
            let forwarded = self.gateway.filter_inbound(parse.packets, now_ms);
            if forwarded.is_empty() {
                continue;
            }
            match RtcpPacket::encode_compound(&forwarded) {
                Ok(wire) => out.push(RawPacket::new(wire)),
                Err(e) => {
                    sink_warn!(&self.logger, "[Session] re-encode failed: {}", e);
                }
            }
        }
        out
    }

    /// Outbound application-originated RTCP (e.g. PLI relayed from another
    /// leg): protect and return the wire form.
    pub fn send_rtcp(&self, pkts: Vec<RawPacket>, _now_ms: i64) -> Vec<RawPacket> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.rtcp_transformer
            .lock()
            .map(|mut t| t.transform(pkts))
            .unwrap_or_default()
    }

    /// Jitter needs arrivals on the stream's clock; until the remote clock
    /// rate is learned from two SRs, transit is pinned to zero.
    fn arrival_rtp_units(&self, ssrc: u32, rtp_ts: u32, now_ms: i64) -> u32 {
        match self.clocks.get(ssrc) {
            Some(clock) if clock.frequency_hz > 0 => {
                ((now_ms * clock.frequency_hz as i64) / 1000) as u32
            }
            _ => rtp_ts,
        }
    }

    /// Idempotent teardown: both lanes' SRTP contexts are dropped exactly
    /// once and all waiters unblock.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rtp_dtls.close();
        if let Some(rtcp_dtls) = &self.rtcp_dtls {
            rtcp_dtls.close();
        }
        if let Ok(mut t) = self.rtp_transformer.lock() {
            t.close();
        }
        if let Ok(mut t) = self.rtcp_transformer.lock() {
            t.close();
        }
        sink_debug!(&self.logger, "[Session] Closed");
    }

    /// Convenience for embedders without their own clock plumbing.
    pub fn now_ms() -> i64 {
        now_millis()
    }
}

/// Protects synthesized compounds on the control lane and ships them.
struct RtcpInjector {
    transformer: Arc<Mutex<DtlsTransformer>>,
    sink: Arc<dyn DatagramSink>,
}

impl PacketInjector for RtcpInjector {
    fn inject(&self, compound: Vec<u8>, _is_data: bool) -> Result<(), String> {
        let protected = self
            .transformer
            .lock()
            .map_err(|_| "rtcp transformer poisoned".to_string())?
            .transform(vec![RawPacket::new(compound)]);
        for pkt in protected {
            self.sink
                .send_datagram(pkt.bytes())
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}
