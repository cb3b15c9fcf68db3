use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// NTP epoch offset from Unix (1900→1970), seconds.
const NTP_UNIX_EPOCH_DIFF: i64 = 2_208_988_800;
/// Unix time of the era-1 NTP rollover (2036-02-07T06:28:16Z), seconds.
const NTP_ERA1_UNIX_BASE: i64 = 2_085_978_496;

#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Convert now() to NTP timestamp (seconds since 1900) split into (msw, lsw)
#[must_use]
pub fn ntp_now() -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    let secs = now.as_secs() as i64 + NTP_UNIX_EPOCH_DIFF;
    let frac = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000u64;
    (secs as u32, frac as u32)
}

/// 64-bit NTP timestamp → Unix milliseconds, applying the RFC 2030 base-epoch
/// rule: an MSB-set seconds field counts from 1900-01-01, a clear MSB from
/// the era-1 base 2036-02-07.
#[must_use]
pub fn ntp_to_unix_ms(ntp: u64) -> i64 {
    let secs = (ntp >> 32) as u32;
    let frac = (ntp & 0xFFFF_FFFF) as u64;
    let base_secs = if secs & 0x8000_0000 != 0 {
        secs as i64 - NTP_UNIX_EPOCH_DIFF
    } else {
        secs as i64 + NTP_ERA1_UNIX_BASE
    };
    let frac_ms = ((frac * 1000) + (1u64 << 31)) >> 32;
    base_secs * 1000 + frac_ms as i64
}

/// Unix milliseconds → 64-bit NTP timestamp (era 0).
#[must_use]
pub fn unix_ms_to_ntp(ms: i64) -> u64 {
    let secs = ms.div_euclid(1000) + NTP_UNIX_EPOCH_DIFF;
    let frac = ((ms.rem_euclid(1000) as u64) << 32) / 1000;
    ((secs as u64) << 32) | frac
}

/// Middle 32 bits of an NTP timestamp, the LSR/DLSR wire form.
#[must_use]
pub fn compact_ntp(ntp: u64) -> u32 {
    ((ntp >> 16) & 0xFFFF_FFFF) as u32
}

/// Milliseconds → 1/65536-second DLSR units, rounded.
#[must_use]
pub fn dlsr_units(delta_ms: i64) -> u32 {
    if delta_ms <= 0 {
        return 0;
    }
    ((delta_ms * 65_536 + 500) / 1000) as u32
}
