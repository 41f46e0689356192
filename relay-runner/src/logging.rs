use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log to stderr so stdout carries only the replayed text.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-v`.
pub fn setup_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn,relay_runner=info,relay_executor=info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose > 0))
        .try_init();
}
