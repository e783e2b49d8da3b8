use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Labtrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "labtrack.db";

/// How long a writer waits for SQLite's write lock before giving up.
/// Concurrent sample creations queue here.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Width of the zero-padded sequence inside a sample code.
pub const SAMPLE_CODE_SEQUENCE_WIDTH: usize = 6;

/// Width of the zero-padded sequence inside a ULR.
pub const ULR_SEQUENCE_WIDTH: usize = 8;

/// Get the application data directory
/// ~/Labtrack/ on all platforms; falls back to the working directory when
/// no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the lab database
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Tracing filter used when `RUST_LOG` is not set
pub fn default_log_filter() -> &'static str {
    "labtrack=info,warn"
}
