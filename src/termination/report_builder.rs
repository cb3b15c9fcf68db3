use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::{
    log::log_sink::LogSink,
    rtcp::{
        RtcpPacket,
        receiver_report::ReceiverReport,
        remb::Remb,
        report_block::ReportBlock,
        sdes::{MAX_CHUNKS, Sdes, SdesChunk, SdesItem},
        sender_info::SenderInfo,
        sender_report::{MAX_RC, SenderReport},
    },
    rtp::{
        receive_stats::ReceiveStatsMap,
        send_stats::SendStatsMap,
        time::unix_ms_to_ntp,
    },
    sink_warn,
    termination::{
        cname_registry::CnameRegistry, feedback_cache::FeedbackCache,
        remote_clock::RemoteClockEstimator, strategy::TerminationMode,
    },
};

/// External producer of the bridge's current bandwidth estimate.
pub trait BandwidthEstimator: Send + Sync {
    fn latest_bps(&self) -> Option<u64>;
}

/// Receive/send state considered dead after this much inactivity.
const STALE_STREAM_MS: i64 = 10_000;
/// Secondary SDES items go out on every third build.
const SDES_THROTTLE: u32 = 3;

/// Synthesizes the bridge's outbound compound RTCP from the harvested
/// per-stream state, packing to the configured MTU.
pub struct ReportBuilder {
    mode: TerminationMode,
    local_ssrc: u32,
    own_cname: Vec<u8>,
    /// NAME/EMAIL/TOOL items for the bridge's own chunk, throttled.
    own_items: Vec<SdesItem>,
    mtu: usize,
    feedback: Arc<FeedbackCache>,
    clocks: Arc<RemoteClockEstimator>,
    cnames: Arc<CnameRegistry>,
    receive_stats: Arc<Mutex<ReceiveStatsMap>>,
    send_stats: Arc<Mutex<SendStatsMap>>,
    estimator: Option<Arc<dyn BandwidthEstimator>>,
    sdes_counter: u32,
    logger: Arc<dyn LogSink>,
}

impl ReportBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: TerminationMode,
        local_ssrc: u32,
        own_cname: Vec<u8>,
        own_items: Vec<SdesItem>,
        mtu: usize,
        feedback: Arc<FeedbackCache>,
        clocks: Arc<RemoteClockEstimator>,
        cnames: Arc<CnameRegistry>,
        receive_stats: Arc<Mutex<ReceiveStatsMap>>,
        send_stats: Arc<Mutex<SendStatsMap>>,
        estimator: Option<Arc<dyn BandwidthEstimator>>,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            mode,
            local_ssrc,
            own_cname,
            own_items,
            mtu,
            feedback,
            clocks,
            cnames,
            receive_stats,
            send_stats,
            estimator,
            sdes_counter: 0,
            logger,
        }
    }

    /// One reporter tick: garbage-collect, then build the compounds to send.
    pub fn build(&mut self, now_ms: i64) -> Vec<Vec<RtcpPacket>> {
        if !self.mode.emits_reports() {
            return Vec::new();
        }

        self.gc(now_ms);

        if let TerminationMode::HighestQuality { percentile } = self.mode {
            if let Some(compounds) = self.build_highest_quality(percentile, now_ms) {
                return compounds;
            }
            // no usable feedback yet: fall through to the basic pipeline
        }

        let (blocks, remote_ssrcs) = {
            let Ok(mut stats) = self.receive_stats.lock() else {
                return Vec::new();
            };
            (stats.build_report_blocks(now_ms), stats.ssrcs())
        };

        let reports = self.build_reports(blocks, now_ms);
        let others = self.build_remb(remote_ssrcs);
        let chunks = self.build_sdes_chunks();

        self.pack_compounds(reports, others, chunks)
    }

    fn gc(&self, now_ms: i64) {
        if let Ok(mut stats) = self.receive_stats.lock() {
            stats.gc(now_ms, STALE_STREAM_MS);
        }
        if let Ok(mut stats) = self.send_stats.lock() {
            stats.gc(now_ms, STALE_STREAM_MS);
        }
        self.clocks.gc(now_ms, STALE_STREAM_MS);
        self.feedback.gc(now_ms);
    }

    /// SRs for every locally-sent SSRC, then RRs; report blocks are absorbed
    /// into the SRs first (31 per packet) so a whole header is saved per
    /// absorbed batch.
    fn build_reports(&self, blocks: Vec<ReportBlock>, now_ms: i64) -> Vec<RtcpPacket> {
        let mut reports = Vec::new();
        let mut blocks = VecDeque::from(blocks);

        if let Ok(send_stats) = self.send_stats.lock() {
            for ssrc in send_stats.ssrcs() {
                let Some(stats) = send_stats.get(ssrc) else {
                    continue;
                };
                let (ntp, rtp_ts) = match self.clocks.estimate(ssrc, now_ms) {
                    Some(est) => (unix_ms_to_ntp(est.system_time_ms), est.rtp_timestamp),
                    None => (unix_ms_to_ntp(now_ms), stats.last_rtp_ts()),
                };
                let mut sr = SenderReport::new(
                    ssrc,
                    SenderInfo {
                        ntp_msw: (ntp >> 32) as u32,
                        ntp_lsw: ntp as u32,
                        rtp_ts,
                        packet_count: stats.packet_count(),
                        octet_count: stats.octet_count(),
                    },
                    Vec::new(),
                );
                while sr.reports.len() < MAX_RC {
                    match blocks.pop_front() {
                        Some(rb) => sr.reports.push(rb),
                        None => break,
                    }
                }
                reports.push(RtcpPacket::Sr(sr));
            }
        }

        while !blocks.is_empty() {
            let take = blocks.len().min(MAX_RC);
            let chunk: Vec<ReportBlock> = blocks.drain(..take).collect();
            reports.push(RtcpPacket::Rr(ReceiverReport::new(self.local_ssrc, chunk)));
        }

        if reports.is_empty() {
            // an empty RR must lead the compound; peers ignore bare REMBs
            reports.push(RtcpPacket::Rr(ReceiverReport::new(
                self.local_ssrc,
                Vec::new(),
            )));
        }
        reports
    }

    fn build_remb(&self, remote_ssrcs: Vec<u32>) -> Vec<RtcpPacket> {
        let Some(estimator) = &self.estimator else {
            return Vec::new();
        };
        let Some(bps) = estimator.latest_bps() else {
            return Vec::new();
        };
        let mut dest = remote_ssrcs;
        dest.sort_unstable();
        match Remb::from_bitrate(self.local_ssrc, bps, dest) {
            Ok(remb) => vec![RtcpPacket::Remb(self.mode.shape_remb(remb))],
            Err(e) => {
                sink_warn!(&self.logger, "[RTCP] REMB skipped: {}", e);
                Vec::new()
            }
        }
    }

    /// Own chunk first (CNAME always, secondary items every third build),
    /// then one CNAME chunk per registry entry.
    fn build_sdes_chunks(&mut self) -> Vec<SdesChunk> {
        let mut own_items = vec![SdesItem::Cname(self.own_cname.clone())];
        if self.sdes_counter % SDES_THROTTLE == 0 {
            own_items.extend(self.own_items.iter().cloned());
        }
        self.sdes_counter = self.sdes_counter.wrapping_add(1);

        let mut chunks = vec![SdesChunk {
            ssrc: self.local_ssrc,
            items: own_items,
        }];
        for (ssrc, cname) in self.cnames.all() {
            if ssrc == self.local_ssrc {
                continue;
            }
            chunks.push(SdesChunk {
                ssrc,
                items: vec![SdesItem::Cname(cname)],
            });
        }
        chunks
    }

    fn cname_for(&self, ssrc: u32) -> Option<Vec<u8>> {
        if ssrc == self.local_ssrc {
            Some(self.own_cname.clone())
        } else {
            self.cnames.get(ssrc)
        }
    }

    fn report_ssrc(report: &RtcpPacket) -> u32 {
        match report {
            RtcpPacket::Sr(sr) => sr.ssrc,
            RtcpPacket::Rr(rr) => rr.ssrc,
            _ => 0,
        }
    }

    fn packet_len(pkt: &RtcpPacket) -> usize {
        pkt.wire_len().unwrap_or(0)
    }

    /// Compound assembly under the MTU budget: one compound per report, the
    /// "other" packets (REMB) only once, a CNAME for the leading report in
    /// every compound, and a final merge pass that concatenates SDES chunks
    /// of adjacent compounds when the result still fits.
    fn pack_compounds(
        &self,
        reports: Vec<RtcpPacket>,
        others: Vec<RtcpPacket>,
        chunks: Vec<SdesChunk>,
    ) -> Vec<Vec<RtcpPacket>> {
        let mut pending: VecDeque<SdesChunk> = chunks.into();
        let mut others = Some(others);
        let mut compounds: Vec<Vec<RtcpPacket>> = Vec::new();

        for report in reports {
            let lead_ssrc = Self::report_ssrc(&report);
            let mut compound = vec![report];
            if let Some(o) = others.take() {
                compound.extend(o);
            }
            let used: usize = compound.iter().map(Self::packet_len).sum();
            let budget = self.mtu.saturating_sub(used);

            let mut sdes = Sdes::default();
            // lead with the chunk owning this compound's first report
            if let Some(pos) = pending.iter().position(|c| c.ssrc == lead_ssrc) {
                if let Some(chunk) = pending.remove(pos) {
                    sdes.chunks.push(chunk);
                }
            } else if let Some(cname) = self.cname_for(lead_ssrc) {
                sdes.chunks.push(SdesChunk {
                    ssrc: lead_ssrc,
                    items: vec![SdesItem::Cname(cname)],
                });
            }
            // greedily fill with the rest of the registry
            while sdes.chunks.len() < MAX_CHUNKS {
                let Some(next) = pending.front() else {
                    break;
                };
                if sdes.wire_len() + next.wire_len() > budget {
                    break;
                }
                if let Some(chunk) = pending.pop_front() {
                    sdes.chunks.push(chunk);
                }
            }
            if !sdes.chunks.is_empty() && sdes.wire_len() <= budget {
                compound.push(RtcpPacket::Sdes(sdes));
            }
            compounds.push(compound);
        }

        // leftover SDES chunks ride behind empty RRs
        while !pending.is_empty() {
            let rr = RtcpPacket::Rr(ReceiverReport::new(self.local_ssrc, Vec::new()));
            let budget = self.mtu.saturating_sub(Self::packet_len(&rr));
            let mut sdes = Sdes::default();
            while sdes.chunks.len() < MAX_CHUNKS {
                let Some(next) = pending.front() else {
                    break;
                };
                if !sdes.chunks.is_empty() && sdes.wire_len() + next.wire_len() > budget {
                    break;
                }
                if let Some(chunk) = pending.pop_front() {
                    sdes.chunks.push(chunk);
                }
            }
            if sdes.chunks.is_empty() {
                break;
            }
            compounds.push(vec![rr, RtcpPacket::Sdes(sdes)]);
        }

        self.merge_adjacent(compounds)
    }

    /// Merge each compound into its predecessor while the union fits the
    /// MTU, concatenating their SDES packets into one (a 4-byte header saved
    /// per merge) and dropping redundant empty RRs.
    fn merge_adjacent(&self, compounds: Vec<Vec<RtcpPacket>>) -> Vec<Vec<RtcpPacket>> {
        let mut merged: Vec<Vec<RtcpPacket>> = Vec::new();
        for compound in compounds {
            let Some(prev) = merged.last_mut() else {
                merged.push(compound);
                continue;
            };
            match Self::try_merge(prev, &compound, self.mtu) {
                Some(combined) => *prev = combined,
                None => merged.push(compound),
            }
        }
        merged
    }

    fn try_merge(a: &[RtcpPacket], b: &[RtcpPacket], mtu: usize) -> Option<Vec<RtcpPacket>> {
        let mut sdes = Sdes::default();
        let mut out: Vec<RtcpPacket> = Vec::new();
        let mut has_report = false;

        for pkt in a.iter().chain(b.iter()) {
            match pkt {
                RtcpPacket::Sdes(s) => {
                    for chunk in &s.chunks {
                        if !sdes.chunks.iter().any(|c| c.ssrc == chunk.ssrc) {
                            sdes.chunks.push(chunk.clone());
                        }
                    }
                }
                RtcpPacket::Rr(rr) if rr.reports.is_empty() && has_report => {
                    // redundant filler once a real report leads the compound
                }
                other => {
                    if matches!(other, RtcpPacket::Sr(_) | RtcpPacket::Rr(_)) {
                        has_report = true;
                    }
                    out.push(other.clone());
                }
            }
        }
        if sdes.chunks.len() > MAX_CHUNKS {
            return None;
        }
        if !sdes.chunks.is_empty() {
            out.push(RtcpPacket::Sdes(sdes));
        }
        let total: usize = out.iter().map(Self::packet_len).sum();
        (total <= mtu).then_some(out)
    }

    /// Percentile selection across the cached feedback; `None` when there is
    /// nothing usable and the basic pipeline should run instead.
    fn build_highest_quality(
        &mut self,
        percentile: u32,
        now_ms: i64,
    ) -> Option<Vec<Vec<RtcpPacket>>> {
        let snapshot = self.feedback.snapshot(now_ms);

        // destination → (score, lowest advertised bitrate)
        let mut agg: Vec<(u32, u64, u64)> = Vec::new();
        for entry in snapshot.values() {
            let Some(remb) = &entry.remb else {
                continue;
            };
            let bitrate = remb.bitrate_bps();
            // wire fraction is /256; the score formula wants percent
            let lost_pct = entry
                .reports
                .as_ref()
                .and_then(|r| r.iter().map(|b| b.fraction_lost).max())
                .map(|f| (f as u64 * 100) / 256)
                .unwrap_or(0);
            let score = bitrate.saturating_mul(100 - lost_pct.min(100)) / 100;
            for dest in &remb.dest {
                match agg.iter_mut().find(|(ssrc, _, _)| ssrc == dest) {
                    Some((_, s, b)) => {
                        *s += score;
                        *b = (*b).min(bitrate);
                    }
                    None => agg.push((*dest, score, bitrate)),
                }
            }
        }
        if agg.is_empty() {
            return None;
        }

        agg.sort_by_key(|(_, score, _)| *score);
        let idx = ((percentile.min(100) as usize) * (agg.len() - 1) + 50) / 100;
        let (chosen, _, bitrate) = agg[idx];

        let blocks = {
            let mut stats = self.receive_stats.lock().ok()?;
            match stats.get_mut(chosen) {
                Some(s) => vec![s.build_report_block(chosen, now_ms)],
                None => Vec::new(),
            }
        };
        let rr = RtcpPacket::Rr(ReceiverReport::new(self.local_ssrc, blocks));

        let others = match Remb::from_bitrate(self.local_ssrc, bitrate, vec![chosen]) {
            Ok(remb) => vec![RtcpPacket::Remb(self.mode.shape_remb(remb))],
            Err(e) => {
                sink_warn!(&self.logger, "[RTCP] HQ REMB skipped: {}", e);
                Vec::new()
            }
        };

        let chunks = self.build_sdes_chunks();
        Some(self.pack_compounds(vec![rr], others, chunks))
    }
}
