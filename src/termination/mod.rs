//! RTCP termination: feedback caches, remote clock estimation, the inbound
//! gateway and the periodic report builder.

pub mod cname_registry;
pub mod feedback_cache;
pub mod gateway;
pub mod remote_clock;
pub mod report_builder;
pub mod reporter;
pub mod strategy;

pub use cname_registry::CnameRegistry;
pub use feedback_cache::{FeedbackCache, FeedbackCacheEntry};
pub use gateway::RtcpGateway;
pub use remote_clock::{RemoteClock, RemoteClockEstimator, Timestamp};
pub use report_builder::{BandwidthEstimator, ReportBuilder};
pub use reporter::{PacketInjector, Reporter};
pub use strategy::TerminationMode;
