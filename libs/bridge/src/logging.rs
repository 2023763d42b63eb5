use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber, honoring the `debug_logging`
/// setting. `RUST_LOG` still wins when set. Safe to call more than once;
/// later calls are no-ops.
pub fn init_logging(debug: bool) {
    let default_filter = if debug {
        "slimthread=debug"
    } else {
        "slimthread=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
