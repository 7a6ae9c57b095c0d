//! Shared utility functions.
//!
//! - `files`: upload naming and retention cleanup
//! - `format`: human-readable sizes and durations
//! - `html`: HTML escaping for hand-built responses

mod files;
mod format;
mod html;

pub use files::{cleanup_old_files, secure_filename};
pub use format::{format_elapsed, format_size};
pub use html::html_escape;
