use std::collections::HashMap;

use crate::rtcp::report_block::ReportBlock;
use crate::rtp::seq::SeqExt;
use crate::rtp::time::{compact_ntp, dlsr_units};

/// Per-SSRC statistics of one received stream, feeding RR report blocks.
#[derive(Debug, Default, Clone)]
pub struct ReceiveStats {
    // sequence/loss
    seqext: SeqExt,
    base_ext_seq: Option<u32>,
    highest_ext_seq: u32,
    received: u32,

    // previous report snapshot for fraction_lost
    prev_lost: i64,
    prev_max_seq: u32,

    // jitter (RFC3550 A.8)
    jitter: u32,
    last_transit: Option<u32>,

    // peer SR timing for LSR/DLSR
    last_sr_ntp: Option<u64>,
    last_sr_receipt_ms: i64,

    last_activity_ms: i64,
}

impl ReceiveStats {
    /// Call on every received RTP packet of this SSRC. `arrival_rtp_units` is
    /// the arrival wall clock expressed in RTP clock units.
    pub fn on_rtp(&mut self, seq: u16, rtp_ts: u32, arrival_rtp_units: u32, now_ms: i64) {
        let ext = self.seqext.update(seq);
        if self.base_ext_seq.is_none() {
            self.base_ext_seq = Some(ext);
            self.prev_max_seq = ext;
        }
        if ext > self.highest_ext_seq {
            self.highest_ext_seq = ext;
        }
        self.received = self.received.wrapping_add(1);
        self.last_activity_ms = now_ms;

        let transit = arrival_rtp_units.wrapping_sub(rtp_ts);
        if let Some(prev) = self.last_transit {
            let d_abs = if transit >= prev {
                transit - prev
            } else {
                prev - transit
            };
            self.jitter = self
                .jitter
                .wrapping_add(((d_abs as u64).saturating_sub(self.jitter as u64) / 16) as u32);
        }
        self.last_transit = Some(transit);
    }

    /// Record the peer's SR so the next RR can answer with LSR/DLSR.
    pub fn on_sr(&mut self, ntp: u64, now_ms: i64) {
        self.last_sr_ntp = Some(ntp);
        self.last_sr_receipt_ms = now_ms;
        self.last_activity_ms = now_ms;
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms
    }

    pub fn highest_ext_seq(&self) -> u32 {
        self.highest_ext_seq
    }

    /// Build one report block, consuming the interval snapshot.
    ///
    /// lost      = max(0, expected − received)
    /// fraction  = round(Δlost / Δexpected · 256), clamped to [0, 255]
    /// dlsr      = round((now − SR receipt) · 65536 / 1000)
    pub fn build_report_block(&mut self, ssrc: u32, now_ms: i64) -> ReportBlock {
        let base = self.base_ext_seq.unwrap_or(0);
        let last_seq = self.highest_ext_seq;
        let expected = (last_seq as i64 - base as i64) + 1;
        let lost = (expected - self.received as i64).max(0);

        let seq_delta = last_seq as i64 - self.prev_max_seq as i64;
        let lost_delta = lost - self.prev_lost;
        let fraction_lost = if seq_delta <= 0 || lost_delta <= 0 {
            0u8
        } else {
            ((lost_delta * 256 + seq_delta / 2) / seq_delta).clamp(0, 255) as u8
        };

        self.prev_lost = lost;
        self.prev_max_seq = last_seq;

        let (lsr, dlsr) = match self.last_sr_ntp {
            Some(ntp) => (
                compact_ntp(ntp),
                dlsr_units(now_ms - self.last_sr_receipt_ms),
            ),
            None => (0, 0),
        };

        ReportBlock {
            ssrc,
            fraction_lost,
            cumulative_lost: lost.min(8_388_607) as i32,
            highest_seq_no_received: last_seq,
            interarrival_jitter: self.jitter,
            lsr,
            dlsr,
        }
    }
}

/// All receive streams of a lane keyed by SSRC. Single writer (the inbound
/// path); the report builder borrows it mutably on the reporter tick.
#[derive(Debug, Default)]
pub struct ReceiveStatsMap {
    streams: HashMap<u32, ReceiveStats>,
}

impl ReceiveStatsMap {
    pub fn entry(&mut self, ssrc: u32) -> &mut ReceiveStats {
        self.streams.entry(ssrc).or_default()
    }

    pub fn get_mut(&mut self, ssrc: u32) -> Option<&mut ReceiveStats> {
        self.streams.get_mut(&ssrc)
    }

    pub fn ssrcs(&self) -> Vec<u32> {
        self.streams.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drop streams idle longer than `max_idle_ms`.
    pub fn gc(&mut self, now_ms: i64, max_idle_ms: i64) {
        self.streams
            .retain(|_, s| now_ms - s.last_activity_ms() <= max_idle_ms);
    }

    /// One report block per stream, in stable SSRC order.
    pub fn build_report_blocks(&mut self, now_ms: i64) -> Vec<ReportBlock> {
        let mut ssrcs: Vec<u32> = self.streams.keys().copied().collect();
        ssrcs.sort_unstable();
        ssrcs
            .into_iter()
            .filter_map(|ssrc| {
                self.streams
                    .get_mut(&ssrc)
                    .map(|s| s.build_report_block(ssrc, now_ms))
            })
            .collect()
    }
}
