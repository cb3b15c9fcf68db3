use std::collections::HashMap;
use std::sync::RwLock;

/// SSRC → CNAME mapping harvested from inbound SDES; consumed when the
/// bridge regenerates SDES on the outbound side.
#[derive(Default)]
pub struct CnameRegistry {
    entries: RwLock<HashMap<u32, Vec<u8>>>,
}

impl CnameRegistry {
    pub fn update(&self, ssrc: u32, cname: &[u8]) {
        if ssrc == 0 || cname.is_empty() {
            return;
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(ssrc, cname.to_vec());
        }
    }

    #[must_use]
    pub fn get(&self, ssrc: u32) -> Option<Vec<u8>> {
        self.entries.read().ok()?.get(&ssrc).cloned()
    }

    /// All known mappings in stable SSRC order.
    #[must_use]
    pub fn all(&self) -> Vec<(u32, Vec<u8>)> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        let mut v: Vec<(u32, Vec<u8>)> =
            entries.iter().map(|(k, c)| (*k, c.clone())).collect();
        v.sort_unstable_by_key(|(ssrc, _)| *ssrc);
        v
    }

    pub fn remove(&self, ssrc: u32) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&ssrc);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
