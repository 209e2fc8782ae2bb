//! Logging bootstrap shared by applock binaries.

use env_logger::{Builder, Env};

/// Initialise the global logger, honouring `RUST_LOG` with `default_level`
/// as the fallback filter. Safe to call more than once; later calls are
/// no-ops.
pub fn init(default_level: &str) {
    let env = Env::default().default_filter_or(default_level);
    let _ = Builder::from_env(env).format_timestamp_secs().try_init();
}
