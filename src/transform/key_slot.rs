use std::sync::RwLock;

use crate::srtp::SrtpSessionConfig;

/// Publication point for the SRTP material derived by the DTLS worker.
///
/// The store happens-before any read that observes `Some`; readers get a
/// fully initialized config or nothing. With rtcp-mux the RTCP lane reads the
/// RTP lane's slot instead of running its own handshake.
#[derive(Default)]
pub struct KeySlot {
    inner: RwLock<Option<SrtpSessionConfig>>,
}

impl KeySlot {
    pub fn publish(&self, cfg: SrtpSessionConfig) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(cfg);
        }
    }

    pub fn get(&self) -> Option<SrtpSessionConfig> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.inner
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Bounded spin-yield wait for the keys, for the rtcp-mux control lane.
    /// Never holds the lock across a yield; gives up after `spins`.
    pub fn wait_brief(&self, spins: u32) -> Option<SrtpSessionConfig> {
        for _ in 0..spins {
            if let Some(cfg) = self.get() {
                return Some(cfg);
            }
            std::thread::yield_now();
        }
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srtp::{SrtpEndpointKeys, SrtpProfile};
    use std::sync::Arc;

    fn cfg() -> SrtpSessionConfig {
        SrtpSessionConfig {
            profile: SrtpProfile::Aes128CmHmacSha1_80,
            outbound: SrtpEndpointKeys {
                master_key: vec![0; 16],
                master_salt: vec![0; 14],
            },
            inbound: SrtpEndpointKeys {
                master_key: vec![1; 16],
                master_salt: vec![1; 14],
            },
        }
    }

    #[test]
    fn empty_slot_gives_nothing() {
        let slot = KeySlot::default();
        assert!(!slot.is_ready());
        assert!(slot.get().is_none());
        assert!(slot.wait_brief(4).is_none());
    }

    #[test]
    fn published_config_visible_from_other_thread() {
        let slot = Arc::new(KeySlot::default());
        let writer = {
            let slot = slot.clone();
            std::thread::spawn(move || slot.publish(cfg()))
        };
        writer.join().ok();
        assert!(slot.is_ready());
        assert!(slot.wait_brief(1).is_some());
    }
}
