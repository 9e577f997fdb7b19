//! Diagnostic logging.
//!
//! Progress lines for the user go to stdout through [`crate::output`]. Everything
//! else (skipped posts, unusable images, failed crops, plan details) is a
//! `tracing` event written to stderr.
//!
//! Log level is controlled by the `GRIDSHARD_LOG` environment variable, using
//! `EnvFilter` directive syntax:
//! - `GRIDSHARD_LOG=debug` for shard plan details
//! - `GRIDSHARD_LOG=info` for standard output (default)
//! - `GRIDSHARD_LOG=warn` for warnings and errors only

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "GRIDSHARD_LOG";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
