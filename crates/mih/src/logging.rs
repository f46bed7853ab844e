use anstream::ColorChoice;
use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use mih_logging::HookFormat;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Show progress messages and warnings by default (overridable by `RUST_LOG`).
    #[default]
    Default,
    /// Show errors only (overridable by `RUST_LOG`).
    Quiet,
    /// Show debug messages, with timestamps (overridable by `RUST_LOG`).
    Verbose,
}

/// Configure `tracing` based on the given [`Level`], taking into account the `RUST_LOG`
/// environment variable.
pub(crate) fn setup_logging(level: Level) -> anyhow::Result<()> {
    let default_directive = match level {
        Level::Default => LevelFilter::INFO,
        Level::Quiet => LevelFilter::ERROR,
        Level::Verbose => LevelFilter::DEBUG,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_directive.into())
        .from_env()
        .context("Invalid RUST_LOG directives")?;

    // The global color choice is set before logging is configured.
    let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Never | ColorChoice::Auto => false,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(HookFormat::default().with_timestamp(level == Level::Verbose))
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_filter(filter),
        )
        .init();

    Ok(())
}
