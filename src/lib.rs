//! Bibliotecario - CSV observation processing with live progress tracking.
//!
//! Uploaded CSV files are processed in the background while clients poll a
//! status endpoint until the session completes or fails.

pub mod cli;
pub mod config;
pub mod models;
pub mod poller;
pub mod processing;
pub mod server;
pub mod session_store;
pub mod utils;
