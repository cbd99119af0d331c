//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing, picking the output format from
/// `LOG_FORMAT` (`json` by default, `pretty` for local runs).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogFormat;
