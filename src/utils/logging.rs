//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in by defining `const ENABLE_LOGS: bool = true;` and pulling
//! the macros in from the crate root (`use crate::{log_info, log_warn};`).
//! Flipping the flag to `false` silences that module without touching call
//! sites.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
