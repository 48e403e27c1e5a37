use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON logs on stdout, level from `RUST_LOG` (default `info`)
///
/// `log` records (actix, the request logger) are forwarded into tracing by
/// `tracing-subscriber`'s default `tracing-log` bridge. Calling this twice
/// is harmless: the second install is ignored.
pub fn init_telemetry() {
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter())
        .with(formatting_layer)
        .try_init()
    {
        tracing::debug!(error = %e, "Telemetry already initialised");
    }
}
