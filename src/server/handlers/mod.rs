//! HTTP request handlers.

mod helpers;
mod pages;
mod results;
mod static_files;
mod status;
mod upload;

pub use pages::{index, upload_form};
pub use results::{download_file, results_page};
pub use static_files::{serve_css, serve_js};
pub use status::{api_status, processing_page};
pub use upload::{upload_file, UploadError};
