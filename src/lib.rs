pub mod authorization;
pub mod catalogue;
pub mod codes;
pub mod compiler; // test data → bound entries → result strings
pub mod config;
pub mod db;
pub mod error;
pub mod formula;
pub mod metadata;
pub mod models;
pub mod report;
pub mod sample;
pub mod test_data;

pub use error::{ErrorKind, LabError};
pub use report::ReportLifecycle;
pub use sample::SampleLifecycle;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
