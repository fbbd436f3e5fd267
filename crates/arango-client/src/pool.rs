use crate::{auth::excerpt, Auth, DatabaseConfig, Error};
use exponential_backoff::Backoff;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Determines how many times a transient failure is retried, and how long to
/// wait before each attempt. Delays grow exponentially with jitter applied by
/// the underlying `exponential-backoff` crate.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    error_count: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        let backoff = Backoff::new(
            attempts,
            Duration::from_millis(100),
            Some(Duration::from_secs(5)),
        );
        Self {
            error_count: 0,
            backoff,
        }
    }

    pub fn with_min(mut self, min: Duration) -> Self {
        self.backoff.set_min(min);
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.backoff.set_max(Some(max));
        self
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.error_count += 1;
        self.backoff.next(self.error_count)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pool dispatches JSON requests across the configured endpoints of a
/// deployment, re-using keep-alive connections of a shared `reqwest::Client`.
///
/// Endpoints are selected round-robin. A transient failure (connection error
/// or 5xx) advances to the next endpoint and retries under the pool's
/// `RetryPolicy`; everything else surfaces to the caller immediately.
#[derive(Clone, Debug)]
pub struct Pool {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    endpoints: Vec<url::Url>,
    next: AtomicUsize,
    auth: Auth,
    retry: RetryPolicy,
}

impl Pool {
    /// Build the HTTP client, resolve authentication once, and return a Pool
    /// ready for request dispatch. Cheap to clone.
    pub async fn connect(config: &DatabaseConfig) -> crate::Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::InvalidEndpoint("<no endpoints configured>".to_string()));
        }

        let endpoints = config
            .endpoints
            .iter()
            .map(|e| url::Url::parse(e).map_err(|_| Error::InvalidEndpoint(e.clone())))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout());

        if let Some(pem) = &config.tls_cert {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|cause| {
                Error::Transport {
                    endpoint: endpoints[0].to_string(),
                    cause,
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|cause| Error::Transport {
            endpoint: endpoints[0].to_string(),
            cause,
        })?;

        let auth = Auth::resolve(config, &http, &endpoints).await?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                endpoints,
                next: AtomicUsize::new(0),
                auth,
                retry: RetryPolicy::new(config.retries),
            }),
        })
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> crate::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(reqwest::Method::POST, path, Some(body))
            .await
    }

    pub async fn put_json<T>(&self, path: &str) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_json::<(), T>(reqwest::Method::PUT, path, None)
            .await
    }

    /// Best-effort DELETE. The response body is discarded.
    pub async fn delete(&self, path: &str) -> crate::Result<()> {
        let _: serde_json::Value = self
            .request_json::<(), _>(reqwest::Method::DELETE, path, None)
            .await?;
        Ok(())
    }

    async fn request_json<B, T>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> crate::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut retry = self.inner.retry.clone();

        loop {
            let endpoint = self.pick_endpoint();
            match self.attempt(endpoint, method.clone(), path, body).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() => match retry.next_backoff() {
                    Some(delay) => {
                        tracing::warn!(
                            endpoint = %endpoint,
                            path,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "transient request failure; retrying against a sibling endpoint"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt<B, T>(
        &self,
        endpoint: &url::Url,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> crate::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = endpoint
            .join(path)
            .map_err(|_| Error::InvalidEndpoint(format!("{endpoint}{path}")))?;

        let mut builder = self.inner.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let builder = self.inner.auth.apply(builder);

        let response = builder.send().await.map_err(|cause| Error::Transport {
            endpoint: endpoint.to_string(),
            cause,
        })?;

        match response.status() {
            status if status.is_success() => {
                response.json().await.map_err(|err| Error::Decode {
                    context: format!("{path}: {err}"),
                })
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(Error::Auth),
            status => Err(Error::HttpStatus {
                code: status.as_u16(),
                body_excerpt: excerpt(&response.text().await.unwrap_or_default()),
            }),
        }
    }

    fn pick_endpoint(&self) -> &url::Url {
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed);
        &self.inner.endpoints[index % self.inner.endpoints.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool(endpoints: Vec<String>) -> Pool {
        Pool::connect(&DatabaseConfig::new(endpoints)).await.unwrap()
    }

    #[tokio::test]
    async fn round_robin_endpoint_selection() {
        let pool = test_pool(vec![
            "http://a.example:8529".to_string(),
            "http://b.example:8529".to_string(),
            "http://c.example:8529".to_string(),
        ])
        .await;

        let picks: Vec<String> = (0..6).map(|_| pool.pick_endpoint().to_string()).collect();
        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_eq!(picks[2], picks[5]);
        assert_ne!(picks[0], picks[1]);
        assert_ne!(picks[1], picks[2]);
    }

    #[tokio::test]
    async fn connect_rejects_empty_and_malformed_endpoints() {
        let err = Pool::connect(&DatabaseConfig::new(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(_)));

        let err = Pool::connect(&DatabaseConfig::new(vec!["not a url".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(ref e) if e == "not a url"));
    }

    #[test]
    fn retry_policy_is_bounded() {
        let mut retry = RetryPolicy::new(3);
        let mut delays = 0;
        while retry.next_backoff().is_some() {
            delays += 1;
            assert!(delays < 16, "retry policy must terminate");
        }
        assert!(delays <= 3);
    }

    #[test]
    fn transient_classification() {
        assert!(Error::HttpStatus {
            code: 503,
            body_excerpt: String::new()
        }
        .is_transient());
        assert!(!Error::HttpStatus {
            code: 404,
            body_excerpt: String::new()
        }
        .is_transient());
        assert!(!Error::Auth.is_transient());
    }
}
