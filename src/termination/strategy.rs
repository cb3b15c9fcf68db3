use crate::rtcp::remb::Remb;

/// Sentinel REMB values used by the throughput-forcing test modes.
pub const MAX_TP_MANTISSA: u32 = 262_143;
pub const MAX_TP_EXP: u8 = 63;
pub const MIN_TP_MANTISSA: u32 = 10;
pub const MIN_TP_EXP: u8 = 1;

/// How the bridge terminates RTCP for one stream, selected at session setup.
///
/// All modes share the same inbound/outbound pipeline; the variants only
/// gate which stages run and reshape REMB where noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMode {
    /// Terminate feedback and synthesize reports from local state.
    Basic,
    /// Forward inbound untouched, synthesize nothing.
    Passthrough,
    /// Emit nothing at all.
    SilentBridge,
    /// Basic, but REMB is pinned to the maximum sentinel.
    MaxThroughput,
    /// Basic, but REMB is pinned to the minimum sentinel.
    MinThroughput,
    /// Score cached feedback per destination and report for the
    /// `percentile`-th destination only.
    HighestQuality { percentile: u32 },
}

impl TerminationMode {
    /// Whether the inbound gateway filters and harvests (false ⇒ forward
    /// packets exactly as they arrived).
    #[must_use]
    pub fn terminates_inbound(self) -> bool {
        !matches!(self, TerminationMode::Passthrough)
    }

    /// Whether inbound packets may be forwarded at all.
    #[must_use]
    pub fn forwards_inbound(self) -> bool {
        !matches!(self, TerminationMode::SilentBridge)
    }

    /// Whether the periodic builder synthesizes reports.
    #[must_use]
    pub fn emits_reports(self) -> bool {
        !matches!(
            self,
            TerminationMode::Passthrough | TerminationMode::SilentBridge
        )
    }

    /// Per-mode REMB shaping hook; the throughput-forcing modes override the
    /// mantissa/exponent, everything else passes through.
    #[must_use]
    pub fn shape_remb(self, mut remb: Remb) -> Remb {
        match self {
            TerminationMode::MaxThroughput => {
                remb.mantissa = MAX_TP_MANTISSA;
                remb.exp = MAX_TP_EXP;
            }
            TerminationMode::MinThroughput => {
                remb.mantissa = MIN_TP_MANTISSA;
                remb.exp = MIN_TP_EXP;
            }
            _ => {}
        }
        remb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remb() -> Remb {
        Remb::from_bitrate(1, 1_000_000, vec![9]).unwrap()
    }

    #[test]
    fn throughput_modes_pin_sentinels() {
        let max = TerminationMode::MaxThroughput.shape_remb(remb());
        assert_eq!((max.mantissa, max.exp), (262_143, 63));
        let min = TerminationMode::MinThroughput.shape_remb(remb());
        assert_eq!((min.mantissa, min.exp), (10, 1));
        // destinations survive the reshaping
        assert_eq!(max.dest, vec![9]);
    }

    #[test]
    fn basic_leaves_remb_alone() {
        let r = remb();
        assert_eq!(TerminationMode::Basic.shape_remb(r.clone()), r);
    }

    #[test]
    fn mode_gates() {
        assert!(TerminationMode::Basic.terminates_inbound());
        assert!(!TerminationMode::Passthrough.terminates_inbound());
        assert!(!TerminationMode::SilentBridge.forwards_inbound());
        assert!(!TerminationMode::Passthrough.emits_reports());
        assert!(TerminationMode::HighestQuality { percentile: 70 }.emits_reports());
    }
}
