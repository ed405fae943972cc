use tracing_subscriber::EnvFilter;

pub(crate) enum Level {
    Quiet,
    Default,
    Verbose,
}

/// Flat line-oriented logs; `RUST_LOG` overrides the verbosity flags.
pub(crate) fn setup_logging(level: Level) {
    let directives = match level {
        Level::Quiet => "warn",
        Level::Default => "info,hyper=warn,reqwest=warn",
        Level::Verbose => "debug,hyper=info,reqwest=info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
