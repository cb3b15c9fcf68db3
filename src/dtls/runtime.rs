use crate::{
    config::Config,
    dtls::{
        certificate::obtain_certificate,
        datagram_channel::{ChannelStream, DatagramChannel},
        dtls_error::DtlsError,
        dtls_role::DtlsRole,
        fingerprint::{self, FingerprintCheck},
    },
    log::log_sink::LogSink,
    sink_debug, sink_error, sink_info, sink_warn,
    srtp::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig, negotiate},
};
use openssl::ssl::{
    HandshakeError, Ssl, SslContextBuilder, SslMethod, SslStream, SslVerifyMode, SslVersion,
};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// TLS exporter label for DTLS-SRTP keying material (RFC 5764 §4.2).
const EXTRACTOR_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// Everything one handshake attempt needs besides the channel.
#[derive(Clone)]
pub struct HandshakeParams {
    pub role: DtlsRole,
    pub profiles: Vec<SrtpProfile>,
    /// hash-function name (lower case) → RFC 4572 fingerprint.
    pub remote_fingerprints: Arc<HashMap<String, String>>,
    /// When false, fingerprint mismatches degrade to warnings.
    pub verify_fingerprints: bool,
    /// Per-receive wait inside the DTLS stack.
    pub read_timeout: Duration,
}

/// Run a single DTLS handshake attempt over `channel` and derive the SRTP
/// session material from the negotiated association.
pub fn run_handshake_attempt(
    channel: Arc<DatagramChannel>,
    config: &Config,
    params: &HandshakeParams,
    logger: Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    sink_info!(
        &logger,
        "[DTLS] Starting handshake as {:?} ({} profiles offered)",
        params.role,
        params.profiles.len()
    );

    let stream = ChannelStream::new(channel, params.read_timeout);
    let dtls_stream = match params.role {
        DtlsRole::Client => dtls_connect(logger.clone(), stream, config, params),
        DtlsRole::Server => dtls_accept(logger.clone(), stream, config, params),
    }
    .map_err(|e| {
        sink_error!(&logger, "[DTLS] Handshake FAILED: {}", e);
        e
    })?;

    let cfg = derive_srtp_keys(&dtls_stream, params, logger.clone()).map_err(|e| {
        sink_error!(&logger, "[DTLS] Key derivation failed: {}", e);
        e
    })?;

    sink_info!(
        &logger,
        "[DTLS] Handshake success; SRTP profile {}",
        cfg.profile.name()
    );
    Ok(cfg)
}

fn dtls_connect(
    logger: Arc<dyn LogSink>,
    stream: ChannelStream,
    config: &Config,
    params: &HandshakeParams,
) -> Result<SslStream<ChannelStream>, DtlsError> {
    sink_debug!(&logger, "[DTLS] Client: Initializing OpenSSL context...");
    let builder = create_base_context(logger.clone(), config, params)?;
    let ssl = Ssl::new(&builder.build())
        .map_err(|e| DtlsError::Ssl(format!("Ssl::new failed: {}", e)))?;

    sink_debug!(&logger, "[DTLS] Client: Starting connect()...");
    match ssl.connect(stream) {
        Ok(s) => Ok(s),
        Err(he) => Err(handshake_error_to_dtlserr(he)),
    }
}

fn dtls_accept(
    logger: Arc<dyn LogSink>,
    stream: ChannelStream,
    config: &Config,
    params: &HandshakeParams,
) -> Result<SslStream<ChannelStream>, DtlsError> {
    sink_debug!(&logger, "[DTLS] Server: Initializing OpenSSL context...");
    let builder = create_base_context(logger.clone(), config, params)?;
    let ssl = Ssl::new(&builder.build())
        .map_err(|e| DtlsError::Ssl(format!("Ssl::new failed: {}", e)))?;

    sink_debug!(&logger, "[DTLS] Server: Starting accept()...");
    match ssl.accept(stream) {
        Ok(s) => Ok(s),
        Err(he) => Err(handshake_error_to_dtlserr(he)),
    }
}

fn derive_srtp_keys(
    stream: &SslStream<ChannelStream>,
    params: &HandshakeParams,
    logger: Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    let selected_profile = stream
        .ssl()
        .selected_srtp_profile()
        .ok_or(DtlsError::NoSrtpProfile)?;

    let profile_name = selected_profile.name();
    sink_debug!(&logger, "[DTLS] Negotiated SRTP profile: {}", profile_name);

    let profile = SrtpProfile::from_name(profile_name).map_err(|_| {
        sink_warn!(
            &logger,
            "[DTLS] Unknown SRTP profile selected: {}",
            profile_name
        );
        DtlsError::NoSrtpProfile
    })?;

    // The peer must have picked something we actually offered.
    if negotiate(&[profile], &params.profiles).is_none() {
        sink_warn!(
            &logger,
            "[DTLS] Peer selected profile {} outside our offer",
            profile_name
        );
        return Err(DtlsError::NoSrtpProfile);
    }

    let key_len = profile.master_key_len();
    let salt_len = profile.master_salt_len();
    let total_len = 2 * (key_len + salt_len);

    let mut key_mat = vec![0u8; total_len];
    stream
        .ssl()
        .export_keying_material(&mut key_mat, EXTRACTOR_LABEL, None)
        .map_err(|e| DtlsError::KeyExport(format!("{}", e)))?;

    let (client_key, rest) = key_mat.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_salt, rest) = rest.split_at(salt_len);
    let (server_salt, _) = rest.split_at(salt_len);

    let client_keys = SrtpEndpointKeys {
        master_key: client_key.to_vec(),
        master_salt: client_salt.to_vec(),
    };
    let server_keys = SrtpEndpointKeys {
        master_key: server_key.to_vec(),
        master_salt: server_salt.to_vec(),
    };

    let (outbound, inbound) = match params.role {
        DtlsRole::Client => (client_keys, server_keys),
        DtlsRole::Server => (server_keys, client_keys),
    };

    Ok(SrtpSessionConfig {
        profile,
        outbound,
        inbound,
    })
}

fn create_base_context(
    logger: Arc<dyn LogSink>,
    config: &Config,
    params: &HandshakeParams,
) -> Result<SslContextBuilder, DtlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::dtls())
        .map_err(|e| DtlsError::Ssl(format!("OpenSSL init failed: {}", e)))?;

    // DTLS 1.0 floor; openssl prefers 1.2 when the peer supports it.
    builder
        .set_min_proto_version(Some(SslVersion::DTLS1))
        .map_err(|e| DtlsError::Ssl(format!("set_min_proto_version failed: {}", e)))?;

    builder
        .set_tlsext_use_srtp(&SrtpProfile::offer_string(&params.profiles))
        .map_err(|e| DtlsError::Ssl(format!("set_tlsext_use_srtp failed: {}", e)))?;

    // SECLEVEL=0 keeps DTLS 1.0 peers and SHA-1-signed certificates workable
    // on OpenSSL 3.x.
    builder
        .set_cipher_list("DEFAULT:@SECLEVEL=0")
        .map_err(|e| DtlsError::Ssl(format!("set_cipher_list failed: {}", e)))?;

    let identity = obtain_certificate(config)?;
    builder
        .set_certificate(&identity.cert)
        .map_err(|e| DtlsError::Ssl(format!("set_certificate failed: {}", e)))?;
    builder
        .set_private_key(&identity.pkey)
        .map_err(|e| DtlsError::Ssl(format!("set_private_key failed: {}", e)))?;
    builder
        .check_private_key()
        .map_err(|e| DtlsError::Ssl(format!("Private key does not match certificate: {}", e)))?;

    let remote_fps = params.remote_fingerprints.clone();
    let enforce = params.verify_fingerprints;
    let logger_cb = logger.clone();

    // Enforce that a peer certificate is present and pin it to the signaled
    // fingerprints; WebRTC trusts signaling, not a CA.
    builder.set_verify_callback(
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        move |_preverify_ok, ctx| {
            let cert = match ctx.current_cert() {
                Some(c) => c,
                None => {
                    sink_warn!(logger_cb, "[DTLS] Verify: No certificate presented by peer!");
                    return false;
                }
            };
            let der = match cert.to_der() {
                Ok(d) => d,
                Err(e) => {
                    sink_error!(logger_cb, "[DTLS] Verify: cannot encode peer cert: {}", e);
                    return false;
                }
            };
            let sig_nid = cert.signature_algorithm().object().nid();
            let hash_name = match fingerprint::hash_name_for_signature(sig_nid) {
                Some(h) => h,
                None => {
                    sink_warn!(
                        logger_cb,
                        "[DTLS] Verify: unsupported signature algorithm ({:?})",
                        sig_nid
                    );
                    return !enforce;
                }
            };

            match fingerprint::verify_fingerprint(&der, hash_name, &remote_fps) {
                FingerprintCheck::Match { hash } => {
                    sink_info!(logger_cb, "[DTLS] Verify: fingerprint matched ({hash})");
                    true
                }
                FingerprintCheck::Mismatch {
                    hash,
                    expected,
                    computed,
                } => {
                    if enforce {
                        sink_error!(
                            logger_cb,
                            "[DTLS] Verify: fingerprint MISMATCH ({hash})\n  Expected: {expected}\n  Got:      {computed}"
                        );
                        false
                    } else {
                        sink_warn!(
                            logger_cb,
                            "[DTLS] Verify: fingerprint mismatch ignored by policy ({hash}): expected {expected}, got {computed}"
                        );
                        true
                    }
                }
                FingerprintCheck::NoSignaledFingerprint => {
                    if enforce {
                        sink_error!(
                            logger_cb,
                            "[DTLS] Verify: no signaled fingerprint usable for {hash_name}"
                        );
                        false
                    } else {
                        sink_warn!(
                            logger_cb,
                            "[DTLS] Verify: no usable fingerprint, accepted by policy"
                        );
                        true
                    }
                }
            }
        },
    );

    Ok(builder)
}

/// Convert a HandshakeError into a DtlsError with a useful message,
/// classifying unexpected_message alerts as retryable.
fn handshake_error_to_dtlserr<E: std::fmt::Debug>(he: HandshakeError<E>) -> DtlsError {
    match he {
        HandshakeError::WouldBlock(_) => DtlsError::Handshake("Handshake would block".into()),
        HandshakeError::Failure(s) => {
            let detail = format!("{:?}", s.into_error());
            if detail.contains("unexpected message") || detail.contains("unexpected_message") {
                DtlsError::UnexpectedMessage(detail)
            } else {
                DtlsError::Handshake(detail)
            }
        }
        HandshakeError::SetupFailure(e) => DtlsError::Ssl(format!("{:?}", e)),
    }
}
