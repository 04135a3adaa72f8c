//! Validation helpers shared by submission requests

use crate::error::AppError;

/// Prefix allowlist for user-supplied input image URLs. Empty allows everything.
#[derive(Debug, Clone, Default)]
pub struct UrlAllowlist {
    prefixes: Vec<String>,
}

impl UrlAllowlist {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.prefixes.is_empty()
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        !self.is_enabled() || self.prefixes.iter().any(|p| url.starts_with(p.as_str()))
    }

    pub fn check(&self, url: &str) -> Result<(), AppError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(AppError::UrlNotAllowed(url.to_string()))
        }
    }

    pub fn check_all<'a>(&self, urls: impl IntoIterator<Item = &'a str>) -> Result<(), AppError> {
        urls.into_iter().try_for_each(|url| self.check(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_allows_everything() {
        let allow = UrlAllowlist::new(vec![" ".to_string()]);
        assert!(!allow.is_enabled());
        assert!(allow.check("http://anything").is_ok());
    }

    #[test]
    fn test_prefix_match() {
        let allow = UrlAllowlist::new(vec![
            "https://cdn.example.com/".to_string(),
            "s3://inputs/".to_string(),
        ]);
        assert!(allow.is_allowed("https://cdn.example.com/a.png"));
        assert!(allow.is_allowed("s3://inputs/b.png"));
        assert!(!allow.is_allowed("https://cdn.example.com.evil.io/a.png"));
        assert!(matches!(
            allow.check_all(["s3://inputs/b.png", "http://x/y.png"]),
            Err(AppError::UrlNotAllowed(url)) if url == "http://x/y.png"
        ));
    }
}
