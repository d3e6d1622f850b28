//! Tracing setup shared by the binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use chia_config::ObservabilityConfig;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// Keeps stdout free for the terminal conversation
    Stderr,
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &ObservabilityConfig, output: LogOutput) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.log_level;
        format!("chia={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = match (config.log_json, output) {
        (true, LogOutput::Stdout) => tracing_subscriber::fmt::layer().json().boxed(),
        (true, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        (false, LogOutput::Stdout) => tracing_subscriber::fmt::layer().boxed(),
        (false, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };
    subscriber.with(fmt_layer).init();
}
