use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins when set, `info` otherwise.
pub fn setup_logger() {
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let mut filter = EnvFilter::new(base);
    if let Ok(directive) = "sqlx=warn".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        // .with_file(true)
        // .with_line_number(true)
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(filter)
        .init();
}
