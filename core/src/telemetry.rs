// Logging setup
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber filtered by `filter`, unless `RUST_LOG`
/// is set, in which case that wins.
///
/// Returns `false` if a global subscriber was already installed; calling it
/// more than once is harmless.
pub fn init_tracing(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .compact()
        .with_target(true)
        .with_env_filter(env_filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
