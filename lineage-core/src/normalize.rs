//! URL canonicalization used for vertex identity.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters that never change which page is served.
pub const DEFAULT_STRIP_PARAMS: &[&str] = &[
    "utm_*",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "sessionid",
    "jsessionid",
    "phpsessid",
    "sid",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Exact keys, or `prefix*` patterns, removed from the query string.
    pub strip_params: Vec<String>,
    /// Treat `http` and `https` as the same page.
    pub unify_scheme: bool,
    /// Treat `www.host` and `host` as the same page.
    pub strip_www: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strip_params: DEFAULT_STRIP_PARAMS.iter().map(|p| p.to_string()).collect(),
            unify_scheme: true,
            strip_www: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    config: NormalizerConfig,
}

impl UrlNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: &str) -> Result<String> {
        let mut url = Url::parse(raw.trim()).map_err(|e| GraphError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        url.set_fragment(None);

        if self.config.unify_scheme && url.scheme() == "http" {
            // Only fails for cannot-be-a-base URLs, which http never is
            let _ = url.set_scheme("https");
        }

        if self.config.strip_www
            && let Some(host) = url.host_str().and_then(|h| h.strip_prefix("www."))
        {
            let host = host.to_string();
            url.set_host(Some(&host)).map_err(|e| GraphError::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
        }

        if url.query().is_some() {
            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !self.is_stripped(key))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.sort();

            if pairs.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(pairs);
            }
        }

        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(path.trim_end_matches('/'));
        }

        Ok(url.to_string())
    }

    fn is_stripped(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.config.strip_params.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_suffix('*') {
                Some(prefix) => key.starts_with(prefix),
                None => key == pattern,
            }
        })
    }
}

/// Normalize with the default configuration.
pub fn normalize_url(raw: &str) -> Result<String> {
    UrlNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_and_www_collapse() {
        assert_eq!(
            normalize_url("http://WWW.Example.com/data/").unwrap(),
            "https://example.com/data"
        );
    }

    #[test]
    fn test_root_path_keeps_slash() {
        assert_eq!(normalize_url("https://example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn test_explicit_default_port_dropped() {
        assert_eq!(
            normalize_url("http://example.com:80/a").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_tracking_params_stripped_and_sorted() {
        assert_eq!(
            normalize_url("https://example.com/d?z=1&utm_source=mail&a=2&fbclid=x#frag").unwrap(),
            "https://example.com/d?a=2&z=1"
        );
    }

    #[test]
    fn test_query_dropped_when_only_tracking() {
        assert_eq!(
            normalize_url("https://example.com/d?utm_campaign=x&SID=abc").unwrap(),
            "https://example.com/d"
        );
    }

    #[test]
    fn test_scheme_kept_when_not_unified() {
        let normalizer = UrlNormalizer::new(NormalizerConfig {
            unify_scheme: false,
            ..NormalizerConfig::default()
        });
        assert_eq!(
            normalizer.normalize("http://example.com/a").unwrap(),
            "http://example.com/a"
        );
    }

    #[test]
    fn test_invalid_url() {
        let err = normalize_url("not a url").unwrap_err();
        assert!(matches!(err, GraphError::InvalidUrl { .. }));
    }
}
