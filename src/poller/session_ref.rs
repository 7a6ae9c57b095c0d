//! Accepting session references pasted from a browser.
//!
//! The poller always works with an explicit session id. This only exists so
//! users can hand the CLI a `/processing/{id}` URL instead of the bare id.

use url::Url;

/// Path segments that are followed by a session id.
const ID_MARKERS: [&str; 4] = ["processing", "results", "status", "download"];

fn is_session_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn id_from_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(pos) = segments.iter().position(|s| ID_MARKERS.contains(s)) {
        return segments
            .get(pos + 1)
            .filter(|s| is_session_id(s))
            .map(|s| s.to_string());
    }

    match segments.as_slice() {
        [only] if is_session_id(only) => Some(only.to_string()),
        _ => None,
    }
}

/// Extract a session id from a bare id, a path or a full URL.
pub fn session_id_from_ref(input: &str) -> Option<String> {
    let input = input.trim();
    if is_session_id(input) {
        return Some(input.to_string());
    }

    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => id_from_path(url.path()),
        _ => id_from_path(input.split(['?', '#']).next().unwrap_or(input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_id() {
        assert_eq!(session_id_from_ref("abc123"), Some("abc123".into()));
        assert_eq!(
            session_id_from_ref(" 6f1c0a52-1d4e-4b43-9d0e-0d1f7c3a9b10 "),
            Some("6f1c0a52-1d4e-4b43-9d0e-0d1f7c3a9b10".into())
        );
    }

    #[test]
    fn test_processing_url() {
        assert_eq!(
            session_id_from_ref("http://localhost:5000/processing/def456?x=1"),
            Some("def456".into())
        );
        assert_eq!(
            session_id_from_ref("/processing/xyz/"),
            Some("xyz".into())
        );
        assert_eq!(
            session_id_from_ref("https://host/api/status/abc123"),
            Some("abc123".into())
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(session_id_from_ref(""), None);
        assert_eq!(session_id_from_ref("http://localhost:5000/processing/"), None);
        assert_eq!(session_id_from_ref("/upload/form"), None);
        assert_eq!(session_id_from_ref("not an id"), None);
    }
}
