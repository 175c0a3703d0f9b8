use std::time::Duration;

use {
    reqwest::{Client, redirect},
    tracing::warn,
    wagate_config::WebhookConfig,
};

/// Settings for a session's outbound webhook client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self::from(&WebhookConfig::default())
    }
}

impl From<&WebhookConfig> for HttpClientOptions {
    fn from(cfg: &WebhookConfig) -> Self {
        Self {
            timeout: cfg.timeout(),
            max_redirects: cfg.max_redirects,
            accept_invalid_certs: cfg.accept_invalid_certs,
        }
    }
}

/// Build the HTTP client a session uses for its webhook deliveries.
pub fn build_http_client(opts: &HttpClientOptions) -> reqwest::Result<Client> {
    if opts.accept_invalid_certs {
        warn!("webhook TLS certificate verification is disabled");
    }
    Client::builder()
        .redirect(redirect::Policy::limited(opts.max_redirects))
        .timeout(opts.timeout)
        .danger_accept_invalid_certs(opts.accept_invalid_certs)
        .user_agent(concat!("wagate/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let cfg = WebhookConfig {
            timeout_secs: 2,
            max_redirects: 3,
            accept_invalid_certs: false,
            ..WebhookConfig::default()
        };
        let opts = HttpClientOptions::from(&cfg);
        assert_eq!(opts.timeout, Duration::from_secs(2));
        assert_eq!(opts.max_redirects, 3);
        assert!(!opts.accept_invalid_certs);
        assert!(build_http_client(&opts).is_ok());
    }

    #[test]
    fn defaults_match_gateway_defaults() {
        let opts = HttpClientOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.max_redirects, 15);
        assert!(opts.accept_invalid_certs);
    }
}
