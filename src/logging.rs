//! Internal logging helpers for structured granary events.

/// Single logging target for granary.
pub(crate) const LOG_TARGET: &str = "granary";

macro_rules! granary_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!($level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use granary_log;
