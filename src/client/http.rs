//! Per-source HTTP transport.
//!
//! An [`HttpSession`] is created for every retrieval call. It owns a cookie
//! jar, the proxy session and the politeness throttle of that source, and it
//! retries transient failures up to the configured attempt count.

use crate::client::providers::{EndpointFamily, SourceError};
use crate::client::proxy::ProxySession;
use crate::client::rate_limiter::PolitenessThrottle;
use crate::client::{HttpClientConfig, SourceId};
use crate::resilience::{Backoff, RetryConfig};
use rand::seq::SliceRandom;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info};

const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
];

/// HTTP transport for one source during one chain execution
#[derive(Debug)]
pub struct HttpSession {
    source: SourceId,
    config: HttpClientConfig,
    user_agent: String,
    jar: Arc<Jar>,
    client: Client,
    proxy: ProxySession,
    throttle: PolitenessThrottle,
    retry: RetryConfig,
}

impl HttpSession {
    pub fn new(
        source: SourceId,
        config: HttpClientConfig,
        proxy: ProxySession,
        throttle: PolitenessThrottle,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        let user_agent = if config.rotate_user_agents {
            BROWSER_USER_AGENTS
                .choose(&mut rand::thread_rng())
                .map_or_else(|| config.user_agent.clone(), |ua| (*ua).to_string())
        } else {
            config.user_agent.clone()
        };

        let jar = Arc::new(Jar::default());
        let client = build_client(&config, &user_agent, &jar, &proxy)?;

        Ok(Self {
            source,
            config,
            user_agent,
            jar,
            client,
            proxy,
            throttle,
            retry,
        })
    }

    #[must_use]
    pub const fn source(&self) -> SourceId {
        self.source
    }

    #[must_use]
    pub const fn throttle(&self) -> &PolitenessThrottle {
        &self.throttle
    }

    pub fn throttle_mut(&mut self) -> &mut PolitenessThrottle {
        &mut self.throttle
    }

    #[must_use]
    pub const fn proxy(&self) -> &ProxySession {
        &self.proxy
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Visit a page only to collect its cookies.
    ///
    /// Failures are logged and never count against the source.
    pub async fn warm_up(&mut self, url: &str) {
        self.throttle.before_request().await;
        match self.client.get(url).send().await {
            Ok(response) => debug!(
                "{} cookie warm-up on {} returned {}",
                self.source,
                url,
                response.status()
            ),
            Err(e) => debug!("{} cookie warm-up on {} failed: {}", self.source, url, e),
        }
    }

    /// GET `url` with query parameters and return the body as text
    pub async fn get_text(
        &mut self,
        family: EndpointFamily,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<String, SourceError> {
        let response = self
            .send(family, url, |client| client.get(url).query(query))
            .await?;
        read_text(response).await
    }

    /// GET `url` with query parameters and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &mut self,
        family: EndpointFamily,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let body = self.get_text(family, url, query).await?;
        decode_json(&body)
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<T: DeserializeOwned>(
        &mut self,
        family: EndpointFamily,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .send(family, url, |client| {
                headers
                    .iter()
                    .fold(client.post(url).json(body), |request, (name, value)| {
                        request.header(*name, *value)
                    })
            })
            .await?;
        let text = read_text(response).await?;
        decode_json(&text)
    }

    async fn send<F>(
        &mut self,
        family: EndpointFamily,
        url: &str,
        build: F,
    ) -> Result<Response, SourceError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let operation = format!("{} {}", self.source, url);
        let mut backoff = Backoff::new(self.retry.clone());

        loop {
            self.throttle.before_request().await;

            let error = match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => {
                    self.throttle.record_success();
                    return Ok(response);
                }
                Ok(response) => SourceError::from_status(response.status().as_u16()),
                Err(e) => self.classify(&e),
            };

            if error.is_proxy_failure() && self.proxy.on_proxy_failure() {
                self.rebuild_client()?;
            }

            let exhausted = self.throttle.record_error(family).await;
            match backoff.next_delay(&error, &operation) {
                Some(delay) if !exhausted => sleep(delay).await,
                _ => return Err(error),
            }
        }
    }

    fn classify(&self, error: &reqwest::Error) -> SourceError {
        if self.proxy.is_proxied() && (error.is_connect() || error.is_timeout()) {
            SourceError::Transport {
                message: error.to_string(),
                proxy_failure: true,
            }
        } else if error.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Transport {
                message: error.to_string(),
                proxy_failure: false,
            }
        }
    }

    fn rebuild_client(&mut self) -> Result<(), SourceError> {
        self.client = build_client(&self.config, &self.user_agent, &self.jar, &self.proxy)?;
        info!("{} HTTP client rebuilt for new proxy route", self.source);
        Ok(())
    }
}

fn build_client(
    config: &HttpClientConfig,
    user_agent: &str,
    jar: &Arc<Jar>,
    proxy: &ProxySession,
) -> Result<Client, SourceError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .user_agent(user_agent)
        .default_headers(headers)
        .cookie_provider(Arc::clone(jar));

    match proxy.current() {
        Some(route) => {
            for p in route.to_reqwest()? {
                builder = builder.proxy(p);
            }
        }
        None => builder = builder.no_proxy(),
    }

    builder.build().map_err(|e| SourceError::Transport {
        message: format!("failed to build HTTP client: {e}"),
        proxy_failure: false,
    })
}

async fn read_text(response: Response) -> Result<String, SourceError> {
    response.text().await.map_err(|e| {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Transport {
                message: format!("failed to read response body: {e}"),
                proxy_failure: false,
            }
        }
    })
}

fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Parse(format!("invalid JSON: {e}")))
}
