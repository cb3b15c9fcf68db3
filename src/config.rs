use std::collections::HashMap;
use std::fs;

#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self {
            globals: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_non_empty_or_default<'a>(
        &'a self,
        section: &str,
        key: &str,
        default: &'a str,
    ) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_bool_or(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_non_empty(section, key) {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            None => default,
        }
    }

    #[must_use]
    pub fn get_u64_or(&self, section: &str, key: &str, default: u64) -> u64 {
        self.get_non_empty(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_usize_or(&self, section: &str, key: &str, default: usize) -> usize {
        self.get_non_empty(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

// ----------------------------------------------------------------------
// RECOGNIZED MEDIA OPTIONS
// ----------------------------------------------------------------------

impl Config {
    /// On `false`, fingerprint mismatches are warned about instead of fatal.
    #[must_use]
    pub fn verify_and_validate_certificate(&self) -> bool {
        self.get_bool_or("DTLS", "verify_and_validate_certificate", true)
    }

    /// On `true`, (S)RTP arriving before SRTP keys are ready is dropped
    /// instead of queued.
    #[must_use]
    pub fn drop_unencrypted_pkts(&self) -> bool {
        self.get_bool_or("SRTP", "drop_unencrypted_pkts", false)
    }

    /// Certificate self-signing algorithm, e.g. `SHA256withRSA`.
    #[must_use]
    pub fn signature_algorithm(&self) -> &str {
        self.get_non_empty_or_default("DTLS", "signature_algorithm", "SHA256withRSA")
    }

    /// Percentile used by the highest-quality termination mode (0..=100).
    #[must_use]
    pub fn percentile(&self) -> u32 {
        (self.get_u64_or("RTCP", "percentile", 70) as u32).min(100)
    }

    /// Reporter period in milliseconds.
    #[must_use]
    pub fn rtcp_interval_ms(&self) -> u64 {
        self.get_u64_or("RTCP", "rtcp_interval_ms", 500)
    }

    /// Compound RTCP size ceiling in bytes.
    #[must_use]
    pub fn mtu(&self) -> usize {
        self.get_usize_or("RTCP", "mtu", 1280)
    }

    /// Colon-separated SRTP protection profile names offered in use_srtp.
    #[must_use]
    pub fn srtp_profiles(&self) -> &str {
        self.get_non_empty_or_default(
            "SRTP",
            "srtp_profiles",
            "SRTP_AES128_CM_SHA1_80:SRTP_AES128_CM_SHA1_32",
        )
    }

    /// Capacity of the inbound DTLS datagram queue.
    #[must_use]
    pub fn dtls_queue_capacity(&self) -> usize {
        self.get_usize_or("DTLS", "queue_capacity", 32)
    }

    /// Capacity of the pre-key SRTP holding queue (per direction).
    #[must_use]
    pub fn holding_queue_capacity(&self) -> usize {
        self.get_usize_or("SRTP", "holding_queue_capacity", 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# global
log_level = debug

[DTLS]
verify_and_validate_certificate = false
signature_algorithm = "SHA1withRSA"

[RTCP]
rtcp_interval_ms = 200
percentile = 110
"#;

    #[test]
    fn parses_sections_and_globals() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_global("log_level"), Some("debug"));
        assert_eq!(cfg.get("DTLS", "signature_algorithm"), Some("SHA1withRSA"));
        assert_eq!(cfg.get("DTLS", "missing"), None);
    }

    #[test]
    fn typed_options_with_defaults() {
        let cfg = Config::parse(SAMPLE);
        assert!(!cfg.verify_and_validate_certificate());
        assert!(!cfg.drop_unencrypted_pkts());
        assert_eq!(cfg.signature_algorithm(), "SHA1withRSA");
        assert_eq!(cfg.rtcp_interval_ms(), 200);
        assert_eq!(cfg.mtu(), 1280);
        // out-of-range percentile clamps
        assert_eq!(cfg.percentile(), 100);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = Config::empty();
        assert!(cfg.verify_and_validate_certificate());
        assert_eq!(cfg.signature_algorithm(), "SHA256withRSA");
        assert_eq!(cfg.rtcp_interval_ms(), 500);
        assert_eq!(cfg.percentile(), 70);
        assert_eq!(cfg.dtls_queue_capacity(), 32);
        assert_eq!(cfg.holding_queue_capacity(), 64);
    }
}
