// Logging module - Logging infrastructure
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the requested verbosity. `level` is the configured
/// default and only applies when neither flag is set.
pub fn filter_directive(verbose: bool, quiet: bool, level: &str) -> String {
    if quiet {
        "error".to_string()
    } else if verbose {
        "termlink=debug,info".to_string()
    } else {
        format!("termlink={},warn", level)
    }
}

/// Initialize logging system. `RUST_LOG` takes precedence over `directive`.
pub fn init_logging(directive: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive)?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()?;

    tracing::debug!("TermLink logging system initialized");
    Ok(())
}
