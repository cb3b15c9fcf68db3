//! rustysfu is the media-plane security and RTCP-termination core of a
//! selective-forwarding conference bridge.
//!
//! Two subsystems do the heavy lifting:
//! - the DTLS-SRTP transport adapter: one datagram flow carrying DTLS
//!   handshake records and (S)RTP/(S)RTCP, with key negotiation via the
//!   use_srtp extension and per-packet protection afterwards;
//! - the RTCP termination engine: inbound feedback is harvested and
//!   suppressed, and the bridge synthesizes its own compound reports on a
//!   periodic schedule with MTU-aware packing.
//!
//! Sockets, ICE, demultiplexing and signaling stay with the embedder; the
//! seams are [`dtls::DatagramSink`], [`transform::PacketTransformer`] and
//! [`session::MediaSession`].

/// Handles configuration loading and management.
pub mod config;
/// DTLS (Datagram Transport Layer Security) implementation.
pub mod dtls;
/// Logging utilities for the library.
pub mod log;
/// RTCP (RTP Control Protocol) packet parsing and building.
pub mod rtcp;
/// RTP-side statistics and clock bookkeeping.
pub mod rtp;
/// Session wiring: lanes, handshake workers and the termination engine.
pub mod session;
/// SRTP (Secure Real-time Transport Protocol) implementation.
pub mod srtp;
/// RTCP termination strategies, caches and the periodic reporter.
pub mod termination;
/// Packet transformers routing DTLS and media over one datagram flow.
pub mod transform;
