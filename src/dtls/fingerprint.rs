use std::collections::HashMap;

use openssl::nid::Nid;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// Hash functions a SHA-1-signed certificate may be verified against when the
/// peer only signaled stronger digests, strongest last (RFC 8122 §5).
pub const UPGRADE_ORDER: [&str; 4] = ["sha-224", "sha-256", "sha-384", "sha-512"];

/// RFC 4572 colon-separated uppercase hex.
#[must_use]
pub fn format_fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Digest `der` with the named hash function (names lower-case, RFC 4572
/// style). `None` for names we cannot compute.
#[must_use]
pub fn compute_fingerprint(der: &[u8], hash_name: &str) -> Option<String> {
    let digest = match hash_name {
        "sha-1" => Sha1::digest(der).to_vec(),
        "sha-224" => Sha224::digest(der).to_vec(),
        "sha-256" => Sha256::digest(der).to_vec(),
        "sha-384" => Sha384::digest(der).to_vec(),
        "sha-512" => Sha512::digest(der).to_vec(),
        _ => return None,
    };
    Some(format_fingerprint(&digest))
}

/// Hash function implied by a certificate's signature algorithm.
#[must_use]
pub fn hash_name_for_signature(nid: Nid) -> Option<&'static str> {
    match nid {
        Nid::SHA1WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA1 | Nid::DSAWITHSHA1 => Some("sha-1"),
        Nid::SHA224WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA224 => Some("sha-224"),
        Nid::SHA256WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA256 => Some("sha-256"),
        Nid::SHA384WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA384 => Some("sha-384"),
        Nid::SHA512WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA512 => Some("sha-512"),
        _ => None,
    }
}

/// Outcome of checking one presented certificate against the signaled map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintCheck {
    Match {
        hash: String,
    },
    Mismatch {
        hash: String,
        expected: String,
        computed: String,
    },
    /// The peer signaled nothing usable for this certificate.
    NoSignaledFingerprint,
}

impl FingerprintCheck {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, FingerprintCheck::Match { .. })
    }
}

/// Verify a presented certificate (DER) against the fingerprints declared
/// over signaling, keyed by lower-case hash-function name.
///
/// The digest implied by the certificate's signature algorithm is tried
/// first. A SHA-1-signed certificate whose hash the peer did not signal is
/// "upgraded": each of the stronger declared digests is recomputed over the
/// certificate and compared. Deterministic: same inputs, same verdict.
#[must_use]
pub fn verify_fingerprint(
    cert_der: &[u8],
    cert_hash_name: &str,
    signaled: &HashMap<String, String>,
) -> FingerprintCheck {
    let mut candidates: Vec<&str> = Vec::new();
    if signaled.contains_key(cert_hash_name) {
        candidates.push(cert_hash_name);
    } else if cert_hash_name == "sha-1" {
        for name in UPGRADE_ORDER {
            if signaled.contains_key(name) {
                candidates.push(name);
            }
        }
    }

    let mut first_mismatch = None;
    for hash in candidates {
        let Some(expected) = signaled.get(hash) else {
            continue;
        };
        let Some(computed) = compute_fingerprint(cert_der, hash) else {
            continue;
        };
        if normalize(expected) == computed {
            return FingerprintCheck::Match {
                hash: hash.to_string(),
            };
        }
        first_mismatch.get_or_insert(FingerprintCheck::Mismatch {
            hash: hash.to_string(),
            expected: expected.clone(),
            computed,
        });
    }
    first_mismatch.unwrap_or(FingerprintCheck::NoSignaledFingerprint)
}

fn normalize(fp: &str) -> String {
    fp.to_ascii_uppercase()
}
