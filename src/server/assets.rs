//! Static asset constants (CSS and JavaScript).

/// Stylesheet for the web interface.
pub const CSS: &str = include_str!("styles.css");

/// Browser-side status poller for the processing page.
pub const POLLER_JS: &str = include_str!("poller.js");
