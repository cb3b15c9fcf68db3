pub mod console_log_sink;
pub mod log_level;
pub mod log_macros;
pub mod log_sink;
pub mod noop_log_sink;
pub use console_log_sink::ConsoleLogSink;
pub use noop_log_sink::NoopLogSink;
