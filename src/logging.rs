//! Logging setup
//!
//! The library only emits through the `log` facade. Binaries call
//! [`init_logging`] once to install an `env_logger` backend.

use crate::config::LogLevel;
use std::io::Write;

/// Install the global logger at the given level
///
/// `RUST_LOG`, when set, takes precedence over `level`. Returns `false` when a
/// logger was already installed.
pub fn init_logging(level: LogLevel) -> bool {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level.into())
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.try_init().is_ok()
}
