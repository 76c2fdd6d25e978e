//! Logging setup and macros
//!
//! Everything logs through `tracing`. With the `android` feature the
//! `ble_*!` macros also mirror each message to the `log` crate so it shows
//! up in logcat through `android_logger`.

use crate::config::LoggingConfig;

#[cfg(feature = "android")]
#[macro_export]
macro_rules! ble_info {
    ($($arg:tt)*) => {{
        tracing::info!($($arg)*);
        log::info!($($arg)*);
    }};
}
#[cfg(not(feature = "android"))]
#[macro_export]
macro_rules! ble_info {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

#[cfg(feature = "android")]
#[macro_export]
macro_rules! ble_debug {
    ($($arg:tt)*) => {{
        tracing::debug!($($arg)*);
        log::debug!($($arg)*);
    }};
}
#[cfg(not(feature = "android"))]
#[macro_export]
macro_rules! ble_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(feature = "android")]
#[macro_export]
macro_rules! ble_warn {
    ($($arg:tt)*) => {{
        tracing::warn!($($arg)*);
        log::warn!($($arg)*);
    }};
}
#[cfg(not(feature = "android"))]
#[macro_export]
macro_rules! ble_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(feature = "android")]
#[macro_export]
macro_rules! ble_error {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*);
        log::error!($($arg)*);
    }};
}
#[cfg(not(feature = "android"))]
#[macro_export]
macro_rules! ble_error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

/// Install the global subscriber described by `config`
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    if !config.enable_logging {
        return;
    }

    let level = parse_log_level(config.log_level.as_deref());

    #[cfg(feature = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(to_log_filter(level))
            .with_tag("QuickBLE"),
    );

    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

fn parse_log_level(level: Option<&str>) -> tracing::Level {
    match level.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => tracing::Level::TRACE,
        Some("debug") => tracing::Level::DEBUG,
        Some("info") => tracing::Level::INFO,
        Some("warn") => tracing::Level::WARN,
        Some("error") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(feature = "android")]
fn to_log_filter(level: tracing::Level) -> log::LevelFilter {
    match level {
        tracing::Level::TRACE => log::LevelFilter::Trace,
        tracing::Level::DEBUG => log::LevelFilter::Debug,
        tracing::Level::INFO => log::LevelFilter::Info,
        tracing::Level::WARN => log::LevelFilter::Warn,
        tracing::Level::ERROR => log::LevelFilter::Error,
    }
}
