use std::fmt::Debug;

/// Builder for [`HttpBackendConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpBackendConfigBuilder {
    api_key: String,
    base_url: Option<String>,
    user_id: Option<String>,
}

impl HttpBackendConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            user_id: None,
        }
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the user whose threads are served.
    #[inline]
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpBackendConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| "http://localhost:8000".to_string());
        HttpBackendConfig {
            api_key: self.api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            user_id: self.user_id.unwrap_or_else(|| "1".to_string()),
        }
    }
}

impl Debug for HttpBackendConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendConfigBuilder")
            .field("api_key", &"<deducted>")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Configuration for the HTTP backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpBackendConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) user_id: String,
}

impl HttpBackendConfig {
    /// Returns the user whose threads are served.
    #[inline]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Debug for HttpBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendConfig")
            .field("api_key", &"<deducted>")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpBackendConfigBuilder::with_api_key("secret").build();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.user_id(), "1");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = HttpBackendConfigBuilder::with_api_key("secret")
            .with_base_url("https://ched.example.com/api/")
            .with_user_id("42")
            .build();
        assert_eq!(config.base_url, "https://ched.example.com/api");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("42"));
    }
}
