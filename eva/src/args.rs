use clap::{Parser, ValueEnum};

/// Verbosity for the binary's `tracing_subscriber` setup, in the style of
/// the sibling daemons' `LogLevel` clap enum.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
        }
    }
}

/// Command line arguments for the `eva` binary. Wires `eva-core`'s
/// components together; concrete device drivers are out of scope (see
/// `stubs.rs`) so most of these are dialogue-service/tuning knobs rather
/// than hardware addresses.
#[derive(Parser, Debug)]
#[command(name = "eva", about = "Perception/dialogue core for the robot")]
pub struct Args {
    /// Duplex websocket URL of the dialogue service.
    #[arg(long, env = "EVA_REALTIME_URL", default_value = "wss://localhost/realtime")]
    pub realtime_url: String,

    /// System prompt sent once via `ConfigureSession`.
    #[arg(long, default_value = "You are a small, curious robot.")]
    pub instructions: String,

    /// Voice id passed through to the dialogue service.
    #[arg(long, default_value = "alloy")]
    pub voice_id: String,

    /// Host:port the tuning HTTP API binds to.
    #[arg(long, default_value = "127.0.0.1:8088")]
    pub tuning_addr: String,

    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}
