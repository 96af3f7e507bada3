//! Subscriber setup for hosts that embed the interop engine.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `jv_bridge=debug`.
pub const LOG_ENV: &str = "JV_LOG";

/// Install a fmt subscriber writing to stderr.
///
/// `JV_LOG` wins over `default_level`. Returns `false` when a global
/// subscriber is already installed, which is common in tests.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_reported_not_fatal() {
        let _ = init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
