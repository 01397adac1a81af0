use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the `debug` flag. Calling this twice is harmless.
pub fn init(debug: bool) {
    let default_level = if debug {
        "smart_desktop_lib=debug,smart_desktop=debug"
    } else {
        "smart_desktop_lib=info,smart_desktop=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
        tracing::info!("still logging");
    }
}
