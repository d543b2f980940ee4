//! Utility functions for storage locators and object naming.
//!
//! Shared by the worker (resolving job inputs) and the storage crate
//! (building artifact keys).

use url::Url;

/// Errors that can occur while resolving a storage locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// Locator is missing or blank
    Empty,
    /// Locator has no path component to take a key from
    NoPath(String),
}

impl std::fmt::Display for LocatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocatorError::Empty => write!(f, "storage locator is empty"),
            LocatorError::NoPath(locator) => {
                write!(f, "storage locator has no object key: {}", locator)
            }
        }
    }
}

impl std::error::Error for LocatorError {}

/// Result type for locator resolution.
pub type LocatorResult<T> = Result<T, LocatorError>;

/// Extract the object key from a job locator.
///
/// A locator is either a full URL or a bare key. The key is the last
/// segment of the path, so `https://cdn.example.com/uploads/ref.mp4` and
/// `uploads/ref.mp4` both resolve to `ref.mp4`. Query strings and
/// fragments are ignored.
pub fn extract_key_from_locator(locator: &str) -> LocatorResult<String> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(LocatorError::Empty);
    }

    let path = match Url::parse(locator) {
        Ok(url) if url.has_host() || url.scheme() == "file" => url.path().to_string(),
        _ => strip_query(locator).to_string(),
    };

    match path.rsplit('/').next() {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(LocatorError::NoPath(locator.to_string())),
    }
}

fn strip_query(s: &str) -> &str {
    let end = s.find(['?', '#']).unwrap_or(s.len());
    &s[..end]
}

/// Turn a display name into a storage-safe slug.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
/// Runs of replacements collapse and the result is lowercased. Falls back
/// to `student` when nothing usable remains.
pub fn storage_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_underscore = false;

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }

    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "student".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_url() {
        assert_eq!(
            extract_key_from_locator("https://pub.r2.dev/uploads/ref.mp4").unwrap(),
            "ref.mp4"
        );
        assert_eq!(
            extract_key_from_locator("https://pub.r2.dev/exec.mp4?sig=abc#t=1").unwrap(),
            "exec.mp4"
        );
    }

    #[test]
    fn test_key_from_bare_key() {
        assert_eq!(extract_key_from_locator("ref.mp4").unwrap(), "ref.mp4");
        assert_eq!(extract_key_from_locator(" uploads/ref.mp4 ").unwrap(), "ref.mp4");
    }

    #[test]
    fn test_key_errors() {
        assert_eq!(extract_key_from_locator("   "), Err(LocatorError::Empty));
        assert!(matches!(
            extract_key_from_locator("https://pub.r2.dev/"),
            Err(LocatorError::NoPath(_))
        ));
        assert!(matches!(
            extract_key_from_locator("uploads/"),
            Err(LocatorError::NoPath(_))
        ));
    }

    #[test]
    fn test_storage_slug() {
        assert_eq!(storage_slug("Ana Souza"), "ana_souza");
        assert_eq!(storage_slug("José  da-Silva!"), "jos_da-silva");
        assert_eq!(storage_slug("../../etc"), "etc");
        assert_eq!(storage_slug("***"), "student");
    }
}
