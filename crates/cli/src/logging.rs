use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "atelie=debug,atelie_orm=debug,warn"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter(verbose)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(Layer::new().with_writer(io::stderr).with_target(verbose))
        .try_init()?;

    Ok(())
}
