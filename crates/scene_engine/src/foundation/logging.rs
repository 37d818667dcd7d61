//! Logging bootstrap
//!
//! Every module logs through the `log` facade; binaries call [`init`] once.

pub use log::{debug, info, warn, error, trace};

/// Initialize `env_logger` with a default filter
///
/// `RUST_LOG` still takes precedence over `default_filter`. Calling this more
/// than once is harmless; later calls are ignored.
pub fn init(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
