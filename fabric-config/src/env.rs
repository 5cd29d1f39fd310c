//! Environment variables read by the registration helper.

use std::path::PathBuf;

/// Registry/bus endpoint variable.
pub const HERMES_URL_ENV: &str = "HERMES_URL";

/// Root directory for component manifest discovery.
pub const TEKTON_ROOT_ENV: &str = "TEKTON_ROOT";

const DEFAULT_HERMES_URL: &str = "http://localhost:8001";

/// Returns the registry endpoint, honoring `HERMES_URL`.
#[must_use]
pub fn hermes_url() -> String {
    std::env::var(HERMES_URL_ENV).unwrap_or_else(|_| DEFAULT_HERMES_URL.to_string())
}

/// Returns the manifest discovery root, honoring `TEKTON_ROOT`.
#[must_use]
pub fn tekton_root() -> PathBuf {
    std::env::var(TEKTON_ROOT_ENV).map_or_else(|_| PathBuf::from("."), PathBuf::from)
}
