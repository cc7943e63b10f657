//! Structured logging
//!
//! Events carry `provider`, `workspace_id` and, for pending requests, only a
//! short prefix of the correlation token. Tokens and secrets are never logged.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
#[must_use]
pub fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,acton_adlink=trace"
    } else {
        "info"
    }
}

/// Initialize logging
///
/// Sets up:
/// - Pretty formatting in debug builds, JSON in release builds
/// - Level filtering from `RUST_LOG`, falling back to [`default_filter`]
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
///
/// # Example
///
/// ```rust,no_run
/// use acton_adlink::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    #[cfg(debug_assertions)]
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .try_init()?;

    #[cfg(not(debug_assertions))]
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;

    Ok(())
}
