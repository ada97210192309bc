//! # Block-Verity Test Suite
//!
//! Unified test crate exercising a fully assembled `VerityTarget`.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── read_path.rs     # Verified reads, devices, status
//!     ├── corruption.rs    # Corruption modes, engines, FEC
//!     └── concurrency.rs   # Shared hash blocks across workers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p verity-tests
//!
//! # By category
//! cargo test -p verity-tests integration::corruption::
//!
//! # Benchmarks
//! cargo bench -p verity-tests
//! ```

pub mod integration;

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Silent unless `RUST_LOG` is set, e.g. `RUST_LOG=block_verity=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true);
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });
}
