//! Tracy profiling support.
//!
//! With the `tracy` feature enabled, every `#[instrument]`ed system and
//! parallel phase span is reported to Tracy through `tracing-tracy`.
//!
//! ## Usage
//!
//! 1. Build with the feature: `cargo build -p marketsim --features tracy`
//! 2. Call [`init_tracy()`] early in main
//! 3. Connect the Tracy GUI or capture tool
//!
//! Each simulated day is closed by [`frame_mark_daily`].

/// Minimum span level captured by Tracy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceLevel {
    /// System and phase spans only
    #[default]
    Info,
    Debug,
    /// Everything, including per-batch spans
    Trace,
}

impl std::str::FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(TraceLevel::Info),
            "debug" => Ok(TraceLevel::Debug),
            "trace" => Ok(TraceLevel::Trace),
            _ => Err(format!("Invalid trace level: {}. Use info, debug, or trace.", s)),
        }
    }
}

/// Install the Tracy subscriber. No-op without the `tracy` feature.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
#[cfg(feature = "tracy")]
pub fn init_tracy(level: TraceLevel) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let filter = match level {
        TraceLevel::Info => LevelFilter::INFO,
        TraceLevel::Debug => LevelFilter::DEBUG,
        TraceLevel::Trace => LevelFilter::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_tracy::TracyLayer::default())
        .with(filter)
        .init();
}

#[cfg(not(feature = "tracy"))]
pub fn init_tracy(_level: TraceLevel) {}

/// Tracy frame marker closing a simulated day.
#[cfg(feature = "tracy")]
#[inline]
pub fn frame_mark_daily() {
    tracy_client::secondary_frame_mark!("daily");
}

#[cfg(not(feature = "tracy"))]
#[inline]
pub fn frame_mark_daily() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace_level() {
        assert_eq!("TRACE".parse::<TraceLevel>(), Ok(TraceLevel::Trace));
        assert_eq!("info".parse::<TraceLevel>(), Ok(TraceLevel::Info));
        assert!("verbose".parse::<TraceLevel>().is_err());
    }
}
