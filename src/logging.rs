//! Subscriber setup for binaries. The library itself only emits events.

use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FORMAT_ENV: &str = "HYDROFETCH_LOG_FORMAT";

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins over `default_level`. Set `HYDROFETCH_LOG_FORMAT=json`
/// for one JSON object per line. Logs go to stderr so stdout stays clean
/// for data. Calling this twice is harmless.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
