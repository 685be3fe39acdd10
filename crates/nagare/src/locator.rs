use std::{fmt, sync::Arc};

use url::Url;

use crate::error::NagareResult;

/// Identifies one fragment on the fragment server.
///
/// Cheap to clone, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentLocator(Arc<Url>);

impl FragmentLocator {
    pub fn new(url: Url) -> Self {
        Self(Arc::new(url))
    }

    /// Resolves a path announced by the notification channel against the
    /// fragment base url.
    ///
    /// The base is treated as a directory even without a trailing slash, so
    /// `http://host/live` + `seg_0.mp4` gives `http://host/live/seg_0.mp4`.
    pub fn resolve(base: &Url, relative: &str) -> NagareResult<Self> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let url = base.join(relative.trim_start_matches('/'))?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Last path segment, used in logs.
    pub fn file_name(&self) -> &str {
        self.0
            .path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.0.as_str())
    }
}

impl fmt::Display for FragmentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Url> for FragmentLocator {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_against_base() {
        let base = Url::parse("http://localhost:8085/").unwrap();
        let locator = FragmentLocator::resolve(&base, "video/seg_0.mp4").unwrap();
        assert_eq!(locator.url().as_str(), "http://localhost:8085/video/seg_0.mp4");
        assert_eq!(locator.file_name(), "seg_0.mp4");
    }

    #[test]
    fn test_resolve_base_without_trailing_slash() {
        let base = Url::parse("http://localhost:8085/live").unwrap();
        let locator = FragmentLocator::resolve(&base, "/seg_1.mp4").unwrap();
        assert_eq!(locator.to_string(), "http://localhost:8085/live/seg_1.mp4");
    }

    #[test]
    fn test_resolve_absolute_path_in_payload() {
        let base = Url::parse("http://localhost:8085/").unwrap();
        let locator = FragmentLocator::resolve(&base, "http://cdn.example/seg_2.mp4").unwrap();
        assert_eq!(locator.to_string(), "http://cdn.example/seg_2.mp4");
    }
}
