use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. `debug` raises
/// this crate to debug level on top of whatever `RUST_LOG` says.
pub fn init(debug: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if debug && let Ok(directive) = "team_reviewers=debug".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(std::env::var_os("DISABLE_COLOR").is_none())
        .with_writer(std::io::stderr)
        .init();
}
