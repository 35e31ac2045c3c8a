use std::time::Duration;

use lumen_core::recognize::TextCleanup;
use url::Url;

use crate::{Error, Result};

/// Configuration for [`PdClient`](super::PdClient).
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use lumen_paddle::PdConfig;
///
/// let config = PdConfig::new("http://paddle:8080")?
///     .with_languages(["en", "ch"])
///     .with_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct PdConfig {
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    user_agent: String,
    languages: Vec<String>,
    use_gpu: bool,
    cleanup: TextCleanup,
}

impl PdConfig {
    /// Creates a configuration for the service at `base_url` with defaults.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url =
            Url::parse(raw).map_err(|e| Error::config(format!("invalid base URL '{raw}': {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("'{raw}' cannot be used as a base URL")));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            user_agent: format!("lumen-paddle/{}", env!("CARGO_PKG_VERSION")),
            languages: vec!["en".to_owned()],
            use_gpu: false,
            cleanup: TextCleanup::default(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` below the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }

        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::config(format!("failed to build URL for '{path}': {e}")))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// The language sent with each request, the first configured one.
    pub fn primary_language(&self) -> &str {
        self.languages.first().map_or("en", String::as_str)
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    pub fn cleanup(&self) -> &TextCleanup {
        &self.cleanup
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay unit; attempt `n` waits `n` times this long.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the recognition languages. Empty lists keep the current value.
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let languages: Vec<String> = languages
            .into_iter()
            .map(|language| {
                let language: String = language.into();
                language.trim().to_owned()
            })
            .filter(|l| !l.is_empty())
            .collect();

        if !languages.is_empty() {
            self.languages = languages;
        }
        self
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn with_cleanup(mut self, cleanup: TextCleanup) -> Self {
        self.cleanup = cleanup;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PdConfig::new("http://localhost:8080").unwrap();
        assert_eq!(config.base_url().as_str(), "http://localhost:8080/");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.primary_language(), "en");
        assert!(!config.use_gpu());
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(matches!(
            PdConfig::new("not a url"),
            Err(Error::Config { .. })
        ));
        assert!(PdConfig::new("mailto:ocr@example.com").is_err());
    }

    #[test]
    fn endpoints_keep_base_path() {
        let config = PdConfig::new("http://gateway/paddle").unwrap();
        assert_eq!(config.endpoint("/ocr").unwrap().as_str(), "http://gateway/paddle/ocr");
        assert_eq!(
            config.endpoint("health").unwrap().as_str(),
            "http://gateway/paddle/health"
        );
    }

    #[test]
    fn languages_ignore_blank_entries() {
        let config = PdConfig::new("http://localhost:8080")
            .unwrap()
            .with_languages([" ch ", "", "en"]);
        assert_eq!(config.languages(), ["ch", "en"]);
        assert_eq!(config.primary_language(), "ch");

        let config = config.with_languages(Vec::<String>::new());
        assert_eq!(config.primary_language(), "ch");
    }
}
