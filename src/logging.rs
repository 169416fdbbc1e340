use log::LevelFilter;

/// Initializes the logger with the `env_logger` crate.
///
/// `RUST_LOG` is honoured; without it only warnings and errors are shown.
pub fn init_logger() {
    init_logger_with_level(LevelFilter::Warn);
}

/// Initializes `env_logger` with `default` as the level when `RUST_LOG` is unset.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logger_with_level(default: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .try_init();
}

/// Maps a `-v` count to a level: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), LevelFilter::Warn);
        assert_eq!(verbosity_level(2), LevelFilter::Debug);
        assert_eq!(verbosity_level(9), LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger();
        init_logger_with_level(LevelFilter::Trace);
    }
}
