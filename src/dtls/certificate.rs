use std::sync::{Arc, Mutex, OnceLock};

use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{X509, X509NameBuilder},
};

use crate::{
    config::Config,
    dtls::{dtls_error::DtlsError, fingerprint},
    rtp::time::now_millis,
};

const RSA_BITS: u32 = 2048;
/// notBefore = now − 1 day: tolerates peer clock skew.
const BACKDATE_SECS: i64 = 86_400;
/// notAfter = now + 6 days.
const VALIDITY_SECS: i64 = 6 * 86_400;
/// Regenerate once the cached certificate is older than a day.
const REFRESH_AFTER_MS: i64 = 86_400_000;

/// A self-signed DTLS identity plus the precomputed values the rest of the
/// stack needs. Immutable once built; consumers hold an `Arc` that stays
/// valid for the lifetime of the session that obtained it.
pub struct CachedCertificate {
    pub cert: X509,
    pub pkey: PKey<Private>,
    pub der: Vec<u8>,
    /// RFC 4572 fingerprint of `der` under `hash_name`.
    pub fingerprint: String,
    /// Lower-case hash name matching the signature algorithm.
    pub hash_name: &'static str,
    created_ms: i64,
}

impl CachedCertificate {
    fn is_stale(&self, now_ms: i64) -> bool {
        now_ms - self.created_ms > REFRESH_AFTER_MS
    }
}

fn cache() -> &'static Mutex<Option<Arc<CachedCertificate>>> {
    static CACHE: OnceLock<Mutex<Option<Arc<CachedCertificate>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(None))
}

/// Obtain the process-wide DTLS certificate, generating or refreshing it as
/// needed. Refresh is serialized through a single critical section.
pub fn obtain_certificate(config: &Config) -> Result<Arc<CachedCertificate>, DtlsError> {
    let mut slot = cache().lock().map_err(|_| {
        DtlsError::CertificateGeneration("certificate cache poisoned".to_string())
    })?;
    let now_ms = now_millis();
    if let Some(cached) = slot.as_ref() {
        if !cached.is_stale(now_ms) {
            return Ok(cached.clone());
        }
    }
    let fresh = Arc::new(generate_certificate(config, now_ms)?);
    *slot = Some(fresh.clone());
    Ok(fresh)
}

/// Map the configured `signature_algorithm` to an openssl digest and the
/// RFC 4572 hash name the published fingerprint uses.
pub fn signature_digest(algorithm: &str) -> Result<(MessageDigest, &'static str), DtlsError> {
    match algorithm.to_ascii_uppercase().as_str() {
        "SHA1WITHRSA" => Ok((MessageDigest::sha1(), "sha-1")),
        "SHA224WITHRSA" => Ok((MessageDigest::sha224(), "sha-224")),
        "SHA256WITHRSA" => Ok((MessageDigest::sha256(), "sha-256")),
        "SHA384WITHRSA" => Ok((MessageDigest::sha384(), "sha-384")),
        "SHA512WITHRSA" => Ok((MessageDigest::sha512(), "sha-512")),
        other => Err(DtlsError::CertificateGeneration(format!(
            "unsupported signature algorithm: {other}"
        ))),
    }
}

/// Build a fresh self-signed RSA certificate for DTLS.
pub fn generate_certificate(
    config: &Config,
    now_ms: i64,
) -> Result<CachedCertificate, DtlsError> {
    let (digest, hash_name) = signature_digest(config.signature_algorithm())?;

    let rsa = Rsa::generate(RSA_BITS)?;
    let pkey = PKey::from_rsa(rsa)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", "rustysfu")?;
    let name = name.build();

    let mut builder = X509::builder()?;
    builder.set_version(2)?;

    let mut serial = BigNum::new()?;
    serial.rand(63, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;

    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&pkey)?;

    let now_secs = now_ms / 1000;
    let not_before = Asn1Time::from_unix(now_secs - BACKDATE_SECS)?;
    let not_after = Asn1Time::from_unix(now_secs + VALIDITY_SECS)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    builder.sign(&pkey, digest)?;
    let cert = builder.build();

    let der = cert.to_der()?;
    let fp = fingerprint::compute_fingerprint(&der, hash_name).ok_or_else(|| {
        DtlsError::CertificateGeneration(format!("no digest for {hash_name}"))
    })?;

    Ok(CachedCertificate {
        cert,
        pkey,
        der,
        fingerprint: fp,
        hash_name,
        created_ms: now_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generates_with_matching_fingerprint() {
        let cfg = Config::empty();
        let cert = generate_certificate(&cfg, now_millis()).unwrap();
        assert_eq!(cert.hash_name, "sha-256");
        assert_eq!(
            fingerprint::compute_fingerprint(&cert.der, "sha-256").unwrap(),
            cert.fingerprint
        );
        // a published fingerprint must verify against its own certificate
        let mut signaled = HashMap::new();
        signaled.insert("sha-256".to_string(), cert.fingerprint.clone());
        assert!(fingerprint::verify_fingerprint(&cert.der, cert.hash_name, &signaled).is_match());
    }

    #[test]
    fn sha1_config_is_accepted() {
        let cfg = Config::parse("[DTLS]\nsignature_algorithm = SHA1withRSA\n");
        let cert = generate_certificate(&cfg, now_millis()).unwrap();
        assert_eq!(cert.hash_name, "sha-1");
    }

    #[test]
    fn unknown_algorithm_rejected() {
        assert!(signature_digest("MD5withRSA").is_err());
    }

    #[test]
    fn staleness_window() {
        let cfg = Config::empty();
        let now = now_millis();
        let cert = generate_certificate(&cfg, now).unwrap();
        assert!(!cert.is_stale(now + REFRESH_AFTER_MS - 1));
        assert!(cert.is_stale(now + REFRESH_AFTER_MS + 1));
    }

    #[test]
    fn cache_returns_same_instance_while_fresh() {
        let cfg = Config::empty();
        let a = obtain_certificate(&cfg).unwrap();
        let b = obtain_certificate(&cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
