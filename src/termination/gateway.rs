use std::sync::Arc;

use crate::{
    log::log_sink::LogSink,
    rtcp::{RtcpPacket, sdes::SdesItem},
    sink_debug,
    termination::{
        cname_registry::CnameRegistry, feedback_cache::FeedbackCache,
        remote_clock::RemoteClockEstimator, strategy::TerminationMode,
    },
};

/// The inbound RTCP gateway: harvests endpoint feedback into the per-stream
/// caches and suppresses everything the bridge regenerates itself, letting
/// only endpoint-actionable packets (PLI/FIR/NACK/BYE/APP/unknown) through.
pub struct RtcpGateway {
    mode: TerminationMode,
    feedback: Arc<FeedbackCache>,
    clocks: Arc<RemoteClockEstimator>,
    cnames: Arc<CnameRegistry>,
    logger: Arc<dyn LogSink>,
}

impl RtcpGateway {
    pub fn new(
        mode: TerminationMode,
        feedback: Arc<FeedbackCache>,
        clocks: Arc<RemoteClockEstimator>,
        cnames: Arc<CnameRegistry>,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            mode,
            feedback,
            clocks,
            cnames,
            logger,
        }
    }

    /// Filter one inbound compound. Harvesting is idempotent per compound:
    /// running the gateway twice over the same packets forwards the same set.
    pub fn filter_inbound(&self, pkts: Vec<RtcpPacket>, now_ms: i64) -> Vec<RtcpPacket> {
        if !self.mode.terminates_inbound() {
            // passthrough: no harvest, no rewrite
            return pkts;
        }

        let mut forwarded = Vec::with_capacity(pkts.len());
        for pkt in pkts {
            match pkt {
                RtcpPacket::Rr(rr) => {
                    self.feedback
                        .update(rr.ssrc, Some(rr.reports), None, now_ms);
                }
                RtcpPacket::Sr(mut sr) => {
                    self.feedback
                        .update(sr.ssrc, Some(sr.reports.clone()), None, now_ms);
                    self.clocks
                        .update(sr.ssrc, sr.info.ntp_timestamp(), sr.info.rtp_ts, now_ms);
                    // the bridge reports reception itself; forward only the
                    // sender info with the blocks cleared
                    sr.reports.clear();
                    forwarded.push(RtcpPacket::Sr(sr));
                }
                RtcpPacket::Sdes(sdes) => {
                    for chunk in &sdes.chunks {
                        for item in &chunk.items {
                            if let SdesItem::Cname(cname) = item {
                                self.cnames.update(chunk.ssrc, cname);
                            }
                        }
                    }
                    sink_debug!(
                        &self.logger,
                        "[RTCP GW] Harvested SDES for {} chunk(s)",
                        sdes.chunks.len()
                    );
                }
                RtcpPacket::Remb(remb) => {
                    self.feedback
                        .update(remb.sender_ssrc, None, Some(remb), now_ms);
                }
                // endpoint-actionable feedback is relayed
                pkt @ (RtcpPacket::Pli(_)
                | RtcpPacket::Fir(_)
                | RtcpPacket::Nack(_)
                | RtcpPacket::Bye(_)
                | RtcpPacket::App(_)
                | RtcpPacket::Raw(_)) => forwarded.push(pkt),
            }
        }

        if self.mode.forwards_inbound() {
            forwarded
        } else {
            Vec::new()
        }
    }
}
