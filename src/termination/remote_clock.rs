use std::collections::HashMap;
use std::sync::RwLock;

use crate::rtp::time::ntp_to_unix_ms;

/// A (wallclock, RTP timestamp) pair on some stream's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub system_time_ms: i64,
    pub rtp_timestamp: u32,
}

/// The last SR-anchored view of one remote sender's clock.
#[derive(Debug, Clone, Copy)]
pub struct RemoteClock {
    pub ssrc: u32,
    pub remote_system_time_ms: i64,
    pub rtp_timestamp: u32,
    pub local_receipt_ms: i64,
    /// RTP clock rate in Hz; −1 until two SRs have been observed.
    pub frequency_hz: i32,
}

/// Per-SSRC NTP↔RTP mapping learned from sender reports.
///
/// Entries are replaced wholesale on each SR; readers never see a partially
/// updated clock.
#[derive(Default)]
pub struct RemoteClockEstimator {
    clocks: RwLock<HashMap<u32, RemoteClock>>,
}

impl RemoteClockEstimator {
    /// Feed one SR. The RTP timestamp difference is unsigned mod 2^32; sign
    /// only enters when forming the final frequency.
    pub fn update(&self, ssrc: u32, ntp_timestamp: u64, rtp_timestamp: u32, now_ms: i64) {
        let remote_ms = ntp_to_unix_ms(ntp_timestamp);
        let Ok(mut clocks) = self.clocks.write() else {
            return;
        };
        let frequency_hz = match clocks.get(&ssrc) {
            Some(prev) => {
                let ms_diff = remote_ms - prev.remote_system_time_ms;
                if ms_diff > 0 {
                    let ts_diff = rtp_timestamp.wrapping_sub(prev.rtp_timestamp) as u64;
                    let hz = (ts_diff * 1000 + (ms_diff as u64 / 2)) / ms_diff as u64;
                    i32::try_from(hz).unwrap_or(prev.frequency_hz)
                } else {
                    prev.frequency_hz
                }
            }
            None => -1,
        };
        clocks.insert(
            ssrc,
            RemoteClock {
                ssrc,
                remote_system_time_ms: remote_ms,
                rtp_timestamp,
                local_receipt_ms: now_ms,
                frequency_hz,
            },
        );
    }

    #[must_use]
    pub fn get(&self, ssrc: u32) -> Option<RemoteClock> {
        self.clocks.read().ok()?.get(&ssrc).copied()
    }

    /// Project the remote clock to `now_ms`. `None` until the clock rate is
    /// known.
    #[must_use]
    pub fn estimate(&self, ssrc: u32, now_ms: i64) -> Option<Timestamp> {
        let clock = self.get(ssrc)?;
        if clock.frequency_hz < 0 {
            return None;
        }
        let elapsed_ms = now_ms - clock.local_receipt_ms;
        let ticks = (elapsed_ms * clock.frequency_hz as i64) / 1000;
        Some(Timestamp {
            system_time_ms: clock.remote_system_time_ms + elapsed_ms,
            rtp_timestamp: clock.rtp_timestamp.wrapping_add(ticks as u32),
        })
    }

    /// Drop clocks not refreshed since `now_ms - max_idle_ms`.
    pub fn gc(&self, now_ms: i64, max_idle_ms: i64) {
        if let Ok(mut clocks) = self.clocks.write() {
            clocks.retain(|_, c| now_ms - c.local_receipt_ms <= max_idle_ms);
        }
    }
}
