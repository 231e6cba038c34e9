use env_logger::Target;
use log::LevelFilter;

/// Installs the process-wide logger.
///
/// Logs go to stderr, which the service manager forwards to the journal.
/// `RUST_LOG` overrides the default `info` level; `--debug` overrides both.
pub fn init(debug: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .target(Target::Stderr)
        .filter_level(LevelFilter::Info)
        .parse_default_env();

    if debug {
        builder.filter_level(LevelFilter::Debug);
    }

    // A second init only happens in tests; keep the first logger.
    let _ = builder.try_init();
}
