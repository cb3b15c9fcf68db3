use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::{
    config::Config,
    dtls::{
        datagram_channel::DatagramChannel,
        dtls_error::DtlsError,
        runtime::{HandshakeParams, run_handshake_attempt},
    },
    log::log_sink::LogSink,
    sink_debug, sink_error, sink_info, sink_warn,
    srtp::SrtpSessionConfig,
};

pub const MAX_HANDSHAKE_ATTEMPTS: u32 = 3;
pub const RETRY_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsSessionState {
    Idle,
    Handshaking,
    Established,
    Closed,
    Failed,
}

/// Receives the derived SRTP material exactly once on success.
pub type KeyConsumer = Box<dyn FnOnce(SrtpSessionConfig) + Send + 'static>;

/// Drives the DTLS handshake on a dedicated worker thread.
///
/// Retries up to [`MAX_HANDSHAKE_ATTEMPTS`] times with [`RETRY_WAIT`] pauses,
/// but only while the failure is an unexpected_message alert and nobody tore
/// the session down in between.
pub struct DtlsSession {
    state: Mutex<DtlsSessionState>,
    disposed: AtomicBool,
    channel: Arc<DatagramChannel>,
    config: Arc<Config>,
    logger: Arc<dyn LogSink>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DtlsSession {
    pub fn new(
        channel: Arc<DatagramChannel>,
        config: Arc<Config>,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DtlsSessionState::Idle),
            disposed: AtomicBool::new(false),
            channel,
            config,
            logger,
            worker: Mutex::new(None),
        })
    }

    pub fn state(&self) -> DtlsSessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(DtlsSessionState::Failed)
    }

    pub fn channel(&self) -> &Arc<DatagramChannel> {
        &self.channel
    }

    fn set_state(&self, new: DtlsSessionState) {
        if let Ok(mut s) = self.state.lock() {
            *s = new;
        }
    }

    /// Spawn the handshake worker. `on_keys` fires on the worker thread after
    /// a successful handshake, before the state flips to Established, so a
    /// reader that observes Established also sees installed keys.
    pub fn start(self: Arc<Self>, params: HandshakeParams, on_keys: KeyConsumer) {
        self.set_state(DtlsSessionState::Handshaking);
        let session = self.clone();
        let handle = thread::Builder::new()
            .name("dtls-handshake".into())
            .spawn(move || session.run_worker(params, on_keys))
            .ok();
        if let Ok(mut worker) = self.worker.lock() {
            *worker = handle;
        }
    }

    fn run_worker(self: Arc<Self>, params: HandshakeParams, on_keys: KeyConsumer) {
        let mut attempt = 1u32;
        loop {
            if self.disposed.load(Ordering::SeqCst) {
                sink_debug!(
                    &self.logger,
                    "[DTLS] Session disposed; abandoning handshake"
                );
                self.set_state(DtlsSessionState::Closed);
                return;
            }

            match run_handshake_attempt(
                self.channel.clone(),
                &self.config,
                &params,
                self.logger.clone(),
            ) {
                Ok(cfg) => {
                    on_keys(cfg);
                    self.set_state(DtlsSessionState::Established);
                    return;
                }
                Err(e) => {
                    let retry = e.is_retryable()
                        && attempt < MAX_HANDSHAKE_ATTEMPTS
                        && !self.disposed.load(Ordering::SeqCst);
                    if !retry {
                        sink_error!(
                            &self.logger,
                            "[DTLS] Handshake attempt {}/{} failed terminally: {}",
                            attempt,
                            MAX_HANDSHAKE_ATTEMPTS,
                            e
                        );
                        self.set_state(if matches!(e, DtlsError::Closed) {
                            DtlsSessionState::Closed
                        } else {
                            DtlsSessionState::Failed
                        });
                        return;
                    }
                    sink_warn!(
                        &self.logger,
                        "[DTLS] Handshake attempt {}/{} failed ({}); retrying in {:?}",
                        attempt,
                        MAX_HANDSHAKE_ATTEMPTS,
                        e,
                        RETRY_WAIT
                    );
                    attempt += 1;
                    thread::sleep(RETRY_WAIT);
                }
            }
        }
    }

    /// Tear down: wakes any blocked receive, marks the session disposed, and
    /// lets the worker observe it between attempts. Idempotent.
    pub fn close(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.channel.close();
        let state = self.state();
        if state != DtlsSessionState::Established && state != DtlsSessionState::Failed {
            self.set_state(DtlsSessionState::Closed);
        }
        sink_info!(&self.logger, "[DTLS] Session closed");
    }

    /// Wait for the worker thread to finish (teardown helper).
    pub fn join(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtls::certificate::obtain_certificate;
    use crate::dtls::datagram_channel::DatagramSink;
    use crate::dtls::dtls_role::DtlsRole;
    use crate::log::NoopLogSink;
    use crate::srtp::SrtpProfile;
    use std::collections::HashMap;
    use std::io;
    use std::sync::mpsc;

    /// Sink that forwards every datagram into the peer's receive queue.
    struct LoopSink {
        peer: Mutex<Option<Arc<DatagramChannel>>>,
    }

    impl LoopSink {
        fn unconnected() -> Arc<Self> {
            Arc::new(Self {
                peer: Mutex::new(None),
            })
        }

        fn connect(&self, peer: Arc<DatagramChannel>) {
            if let Ok(mut p) = self.peer.lock() {
                *p = Some(peer);
            }
        }
    }

    impl DatagramSink for LoopSink {
        fn send_datagram(&self, buf: &[u8]) -> io::Result<()> {
            let peer = self.peer.lock().map_err(|_| io::Error::other("poisoned"))?;
            match peer.as_ref() {
                Some(ch) => {
                    ch.push_datagram(buf);
                    Ok(())
                }
                None => Err(io::Error::other("peer not connected")),
            }
        }
    }

    fn params(role: DtlsRole, fps: HashMap<String, String>) -> HandshakeParams {
        HandshakeParams {
            role,
            profiles: vec![
                SrtpProfile::Aes128CmHmacSha1_80,
                SrtpProfile::Aes128CmHmacSha1_32,
            ],
            remote_fingerprints: Arc::new(fps),
            verify_fingerprints: true,
            read_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn loopback_handshake_derives_mirrored_keys() {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let config = Arc::new(Config::empty());

        let client_sink = LoopSink::unconnected();
        let server_sink = LoopSink::unconnected();
        let client_ch = Arc::new(DatagramChannel::new(
            32,
            1280,
            client_sink.clone(),
            logger.clone(),
        ));
        let server_ch = Arc::new(DatagramChannel::new(
            32,
            1280,
            server_sink.clone(),
            logger.clone(),
        ));
        client_sink.connect(server_ch.clone());
        server_sink.connect(client_ch.clone());

        // both sides share the process certificate, so each side's expected
        // fingerprint is our own published one
        let identity = obtain_certificate(&config).unwrap();
        let mut fps = HashMap::new();
        fps.insert(identity.hash_name.to_string(), identity.fingerprint.clone());

        let client = DtlsSession::new(client_ch, config.clone(), logger.clone());
        let server = DtlsSession::new(server_ch, config.clone(), logger.clone());

        let (ctx_tx, ctx_rx) = mpsc::channel();
        let tx_client = ctx_tx.clone();
        client.clone().start(
            params(DtlsRole::Client, fps.clone()),
            Box::new(move |cfg| {
                let _ = tx_client.send(("client", cfg));
            }),
        );
        server.clone().start(
            params(DtlsRole::Server, fps),
            Box::new(move |cfg| {
                let _ = ctx_tx.send(("server", cfg));
            }),
        );

        let mut results = HashMap::new();
        for _ in 0..2 {
            let (who, cfg) = ctx_rx
                .recv_timeout(Duration::from_secs(20))
                .expect("handshake result");
            results.insert(who, cfg);
        }
        client.join();
        server.join();

        assert_eq!(client.state(), DtlsSessionState::Established);
        assert_eq!(server.state(), DtlsSessionState::Established);

        let c = &results["client"];
        let s = &results["server"];
        assert_eq!(c.profile, s.profile);
        // the client's outbound keys are the server's inbound keys
        assert_eq!(c.outbound.master_key, s.inbound.master_key);
        assert_eq!(c.outbound.master_salt, s.inbound.master_salt);
        assert_eq!(c.inbound.master_key, s.outbound.master_key);
        // directions must not share keystream
        assert_ne!(c.outbound.master_key, c.inbound.master_key);

        client.close();
        server.close();
    }

    #[test]
    fn close_before_start_abandons_handshake() {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let config = Arc::new(Config::empty());
        let sink = LoopSink::unconnected();
        let ch = Arc::new(DatagramChannel::new(4, 1280, sink, logger.clone()));
        let session = DtlsSession::new(ch, config, logger);
        session.close();
        session.clone().start(
            params(DtlsRole::Client, HashMap::new()),
            Box::new(|_| panic!("keys must not be delivered")),
        );
        session.join();
        assert_eq!(session.state(), DtlsSessionState::Closed);
    }
}
