//! Utility functions and helpers.

pub mod console;
pub mod http;
pub mod text;
pub mod url;

pub use text::fold;
pub use url::{canonical_url, fingerprint};
