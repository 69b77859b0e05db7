use tracing::level_filters::LevelFilter;

pub(crate) fn init_tracer(level: Option<LevelFilter>) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;

    let default_filter = if cfg!(any(test, debug_assertions)) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let default_filter = level.unwrap_or(default_filter);
    let filter_layer = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env_lossy();

    let to_stderr = std::env::var("HALOW_RC_LOG_TO_STDERR").is_ok();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_line_number(cfg!(debug_assertions));

    if to_stderr {
        let subscriber = tracing_subscriber::registry()
            .with(fmt_layer.with_writer(std::io::stderr))
            .with(filter_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
