use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use crate::{
    log::log_sink::LogSink,
    rtcp::RtcpPacket,
    sink_debug, sink_warn,
    termination::report_builder::ReportBuilder,
};

/// Delivers a synthesized compound to the wire. `is_data` is false for every
/// packet the reporter injects (control traffic, not media).
pub trait PacketInjector: Send + Sync {
    fn inject(&self, compound: Vec<u8>, is_data: bool) -> Result<(), String>;
}

/// Single-shot "maybe report" hook driven from the outbound RTP hot path.
///
/// Cheap when idle: one atomic load per call. The compare-exchange arms the
/// next deadline exactly once even when data threads race the tick.
pub struct Reporter {
    next_fire_ms: AtomicI64,
    interval_ms: i64,
    builder: Mutex<ReportBuilder>,
    logger: Arc<dyn LogSink>,
}

impl Reporter {
    pub fn new(interval_ms: u64, builder: ReportBuilder, logger: Arc<dyn LogSink>) -> Self {
        Self {
            next_fire_ms: AtomicI64::new(0),
            interval_ms: interval_ms.max(1) as i64,
            builder: Mutex::new(builder),
            logger,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Fire the builder if the deadline passed. Returns how many compounds
    /// were injected (0 on a quiet tick or when it is not time yet).
    pub fn maybe_report(&self, now_ms: i64, injector: &dyn PacketInjector) -> usize {
        let next = self.next_fire_ms.load(Ordering::Acquire);
        if now_ms < next {
            return 0;
        }
        if self
            .next_fire_ms
            .compare_exchange(next, now_ms + self.interval_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // another thread claimed this tick
            return 0;
        }

        let compounds = match self.builder.lock() {
            Ok(mut builder) => builder.build(now_ms),
            Err(_) => return 0,
        };

        let mut injected = 0usize;
        for compound in compounds {
            let wire = match RtcpPacket::encode_compound(&compound) {
                Ok(w) => w,
                Err(e) => {
                    sink_warn!(&self.logger, "[RTCP] compound encode failed: {}", e);
                    continue;
                }
            };
            match injector.inject(wire, false) {
                Ok(()) => injected += 1,
                Err(e) => {
                    // the channel may be mid-teardown; the timer carries on
                    sink_debug!(&self.logger, "[RTCP] inject failed: {}", e);
                }
            }
        }
        injected
    }
}
