//! Utilities shared by the CLI and the subscription import path.
//!
//! - **URL policy**: SSRF-aware validation of subscription URLs
//! - **Atomic writes**: temp file + rename for exported documents

mod fs;
mod url_validator;

pub use fs::write_atomic;
pub use url_validator::{UrlPolicy, UrlValidationError};
