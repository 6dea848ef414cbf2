//! Utility functions for common operations.
//!
//! - **URL validation**: backend endpoint checks and safe opening of listing images
//! - **Text processing**: terminal-safe sanitizing and width-aware truncation

mod text;
mod url_validator;

pub use text::{sanitize_line, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_endpoint, validate_url_for_open, UrlValidationError};
