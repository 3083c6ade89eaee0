use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` directives are honoured; `vigil=<level>` is added on top so
/// the pipeline crates log at the configured level by default. Calling it
/// twice is harmless.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let directive = format!("vigil={level}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    Ok(())
}
