//! Fine-grained debug verbosity on top of the `log` facade.
//!
//! The CLI contract exposes DEBUG levels 1-4 below `debug`. The `log` crate
//! has no sub-debug levels, so the extra detail is a process-wide threshold
//! consulted by the `debug1!`..`debug4!` macros before delegating to
//! `log::debug!`.

use std::sync::atomic::{AtomicU8, Ordering};

use log::LevelFilter;

static DEBUG_DETAIL: AtomicU8 = AtomicU8::new(0);

/// Set the sub-debug detail threshold (0 disables `debugN!` output).
pub fn set_debug_detail(level: u8) {
    DEBUG_DETAIL.store(level, Ordering::Relaxed);
}

pub fn debug_detail() -> u8 {
    DEBUG_DETAIL.load(Ordering::Relaxed)
}

/// Parse a `--log_level` value into a `log` filter plus the detail threshold.
///
/// Accepted values: `error`, `warning`, `info`, `debug`, and `debug1` through
/// `debug4` (increasingly verbose).
pub fn parse_level(value: &str) -> Option<(LevelFilter, u8)> {
    use cow_utils::CowUtils;
    match value.cow_to_lowercase().as_ref() {
        "error" => Some((LevelFilter::Error, 0)),
        "warning" | "warn" => Some((LevelFilter::Warn, 0)),
        "info" => Some((LevelFilter::Info, 0)),
        "debug" => Some((LevelFilter::Debug, 0)),
        "debug1" => Some((LevelFilter::Debug, 1)),
        "debug2" => Some((LevelFilter::Debug, 2)),
        "debug3" => Some((LevelFilter::Debug, 3)),
        "debug4" => Some((LevelFilter::Debug, 4)),
        _ => None,
    }
}

#[macro_export]
macro_rules! debug1 {
    ($($arg:tt)*) => {
        if $crate::logging::debug_detail() >= 1 {
            ::log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! debug2 {
    ($($arg:tt)*) => {
        if $crate::logging::debug_detail() >= 2 {
            ::log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! debug3 {
    ($($arg:tt)*) => {
        if $crate::logging::debug_detail() >= 3 {
            ::log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! debug4 {
    ($($arg:tt)*) => {
        if $crate::logging::debug_detail() >= 4 {
            ::log::debug!($($arg)*);
        }
    };
}
