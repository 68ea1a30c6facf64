//! Logging bootstrap for wheel binaries.
//!
//! Filters come from `RUST_LOG` when set, otherwise from the given default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "wheel=info";

/// Install the global subscriber with [`DEFAULT_FILTER`].
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// Install the global subscriber, falling back to `default_filter`.
///
/// Does nothing if a subscriber is already installed, so tests may call it
/// repeatedly.
pub fn init_with_default(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();

    if installed.is_ok() {
        tracing::debug!("Logging initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_with_default("debug");
        init();
    }
}
