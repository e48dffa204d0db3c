use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter};

/// Install colored backtraces and, when the crate was built with `DEBUG` set,
/// a subscriber that prints every event of the dump pipeline to stderr.
///
/// `DEBUG` holds the filter directive, e.g. `DEBUG=cache_dump=trace`; an
/// empty value enables `debug` for everything.
pub fn setup_test_log() {
    color_backtrace::install();
    let Some(directive) = option_env!("DEBUG") else {
        return;
    };
    let filter = if directive.is_empty() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(directive)
    };
    // a subscriber may already be installed
    let _ = tracing::subscriber::set_global_default(
        Registry::default().with(filter).with(
            fmt::Layer::default()
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_file(true),
        ),
    );
}
