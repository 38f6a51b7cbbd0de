//! Log threshold handling.
//!
//! The library only emits `tracing` events. Binaries call [`init`] once to
//! install a stderr subscriber filtered by `BALLISTICS_LOG_LEVEL`.

use std::sync::Once;
use tracing::level_filters::LevelFilter;

/// Environment variable holding the integer log threshold
pub const LOG_LEVEL_ENV: &str = "BALLISTICS_LOG_LEVEL";

static INIT: Once = Once::new();

/// Map an integer threshold (10 = debug, 20 = info, 30 = warning, 40 = error)
/// onto a level filter. Unset or unparsable values mean errors only.
pub fn level_from_env_value(value: Option<&str>) -> LevelFilter {
    let Some(level) = value.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return LevelFilter::ERROR;
    };
    match level {
        i64::MIN..=5 => LevelFilter::TRACE,
        6..=10 => LevelFilter::DEBUG,
        11..=20 => LevelFilter::INFO,
        21..=30 => LevelFilter::WARN,
        31..=40 => LevelFilter::ERROR,
        _ => LevelFilter::OFF,
    }
}

/// Install the global stderr subscriber. Later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_LEVEL_ENV).ok();
        let filter = level_from_env_value(value.as_deref());
        // Another subscriber may already be installed by an embedding binary
        let _ = tracing_subscriber::fmt()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
