//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides `filter` when set.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init(filter: &str) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Clinic core v{} logging initialised", env!("CARGO_PKG_VERSION"));
    }
    installed
}
