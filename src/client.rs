// src/client.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{header, HeaderValue, Method, Request, Response, Uri};
use hyper::body::Incoming;
use tokio::time::Instant;
use tower::util::BoxCloneSyncService;
use tower::{Layer, ServiceExt};
use url::Url;

use crate::auth::{platform, Credentials, ImpersonationCredentials};
use crate::body::Body;
use crate::config::{AuthMethod, Config, DEFAULT_TIMEOUT};
use crate::error;
use crate::proxy::Proxy;
use crate::transport::{Deadline, HttpTransport, LogHttpLayer};
use crate::Result;

type BoxedTransport = BoxCloneSyncService<Request<Body>, Response<Incoming>, crate::Error>;

/// An HTTP client that authenticates with Negotiate when challenged.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    service: BoxedTransport,
    endpoint: Option<Url>,
    timeout: Option<Duration>,
    bearer: Option<HeaderValue>,
}

#[derive(Clone, Default)]
enum Auth {
    #[default]
    None,
    Bearer(String),
    Negotiate(Credentials),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Auth::Negotiate(credentials) => f.debug_tuple("Negotiate").field(credentials).finish(),
        }
    }
}

/// A `ClientBuilder` can be used to create a `Client` with custom
/// authentication and timeouts.
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    auth: Auth,
    log_http: bool,
    proxy: Option<Proxy>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            endpoint: None,
            timeout: Some(DEFAULT_TIMEOUT),
            auth: Auth::None,
            log_http: false,
            proxy: None,
        }
    }

    /// Start from a [`Config`].
    pub fn from_config(config: &Config) -> Result<ClientBuilder> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout_seconds.map_or(DEFAULT_TIMEOUT, Duration::from_secs))
            .log_http(config.log_http);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint(&config.endpoint);
        }

        if !config.proxy.trim().is_empty() {
            builder = builder.proxy(Proxy::all(&config.proxy)?);
        }

        let auth = &config.auth;
        builder = match auth.method.parse::<AuthMethod>()? {
            AuthMethod::None => builder,
            AuthMethod::Bearer => {
                if auth.password.is_empty() {
                    return Err(error::builder("bearer auth requires a token"));
                }
                builder.bearer_auth(&auth.password)
            }
            AuthMethod::Negotiate if auth.username.is_empty() => builder.negotiate(),
            AuthMethod::Negotiate => {
                builder.negotiate_with_credentials(&auth.username, &auth.password)
            }
        };

        Ok(builder)
    }

    /// Resolve relative request paths against this base URL.
    pub fn endpoint(mut self, endpoint: impl AsRef<str>) -> ClientBuilder {
        self.endpoint = Some(endpoint.as_ref().to_owned());
        self
    }

    /// Bound the whole request, every authentication leg included.
    ///
    /// Defaults to five minutes.
    pub fn timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout.
    pub fn no_timeout(mut self) -> ClientBuilder {
        self.timeout = None;
        self
    }

    /// Answer Negotiate challenges as the current user.
    pub fn negotiate(mut self) -> ClientBuilder {
        self.auth = Auth::Negotiate(Credentials::CurrentUser);
        self
    }

    /// Answer Negotiate challenges as another account.
    ///
    /// `username` is either `DOMAIN\user` or a bare/UPN user name. Each
    /// request logs on with these credentials and impersonates the account
    /// for its duration. Platforms without impersonation support ignore the
    /// credentials and behave like [`ClientBuilder::negotiate`].
    pub fn negotiate_with_credentials(
        mut self,
        username: impl AsRef<str>,
        password: impl Into<String>,
    ) -> ClientBuilder {
        let credentials = ImpersonationCredentials::new(username, password);
        self.auth = Auth::Negotiate(Credentials::Explicit(credentials));
        self
    }

    /// Send `Authorization: Bearer <token>` on every request that does not
    /// already carry an `Authorization` header.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> ClientBuilder {
        self.auth = Auth::Bearer(token.into());
        self
    }

    /// Log every request and response (each authentication leg) at debug
    /// level.
    pub fn log_http(mut self, enabled: bool) -> ClientBuilder {
        self.log_http = enabled;
        self
    }

    /// Route every request through `proxy`.
    pub fn proxy(mut self, proxy: Proxy) -> ClientBuilder {
        self.proxy = Some(proxy);
        self
    }

    pub fn build(self) -> Result<Client> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(error::builder)?;

        let base = HttpTransport::with_proxy(self.proxy)?;
        let mut service: BoxedTransport = if self.log_http {
            BoxCloneSyncService::new(LogHttpLayer.layer(base))
        } else {
            BoxCloneSyncService::new(base)
        };

        let mut bearer = None;
        match self.auth {
            Auth::None => {}
            Auth::Bearer(token) => {
                let mut value = HeaderValue::try_from(format!("Bearer {}", token))
                    .map_err(error::builder)?;
                value.set_sensitive(true);
                bearer = Some(value);
            }
            Auth::Negotiate(Credentials::CurrentUser) => {
                service = BoxCloneSyncService::new(platform::negotiate_layer().layer(service));
            }
            Auth::Negotiate(Credentials::Explicit(credentials)) => {
                let negotiated = platform::negotiate_layer().layer(service);
                service = BoxCloneSyncService::new(
                    platform::impersonate_layer(credentials).layer(negotiated),
                );
            }
        }

        Ok(Client {
            inner: Arc::new(ClientRef {
                service,
                endpoint,
                timeout: self.timeout,
                bearer,
            }),
        })
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn from_config(config: &Config) -> Result<Client> {
        ClientBuilder::from_config(config)?.build()
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.inner.endpoint.as_ref()
    }

    /// Send a request through the authentication stack.
    pub async fn execute(&self, mut request: Request<Body>) -> Result<Response<Incoming>> {
        if let Some(bearer) = &self.inner.bearer {
            request
                .headers_mut()
                .entry(header::AUTHORIZATION)
                .or_insert_with(|| bearer.clone());
        }

        if let Some(timeout) = self.inner.timeout {
            request
                .extensions_mut()
                .insert(Deadline(Instant::now() + timeout));
        }

        self.inner.service.clone().oneshot(request).await
    }

    /// Send a request to `path`, resolved against the endpoint if one is
    /// configured.
    pub async fn request(&self, method: Method, path: &str, body: Body) -> Result<Response<Incoming>> {
        let uri = self.resolve(path)?;
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .map_err(error::builder)?;

        self.execute(request).await
    }

    pub async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        self.request(Method::GET, path, Body::empty()).await
    }

    fn resolve(&self, path: &str) -> Result<Uri> {
        let url = match &self.inner.endpoint {
            Some(base) => base.join(path),
            None => Url::parse(path),
        }
        .map_err(error::builder)?;

        url.as_str().parse::<Uri>().map_err(error::builder)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint.as_ref().map(Url::as_str))
            .field("timeout", &self.inner.timeout)
            .field("bearer", &self.inner.bearer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    #[tokio::test]
    async fn test_resolve_against_endpoint() {
        let client = Client::builder()
            .endpoint("https://hyperv.corp.local/api/v2/")
            .build()
            .unwrap();

        assert_eq!(
            client.resolve("vms/vm01").unwrap(),
            "https://hyperv.corp.local/api/v2/vms/vm01"
        );
        assert_eq!(
            client.resolve("https://other.corp.local/whoami").unwrap(),
            "https://other.corp.local/whoami"
        );
    }

    #[tokio::test]
    async fn test_resolve_without_endpoint_requires_absolute_url() {
        let client = Client::builder().build().unwrap();
        assert!(client.resolve("vms").unwrap_err().is_builder());
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let err = Client::builder().endpoint("not a url").build().unwrap_err();
        assert!(err.is_builder());
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            endpoint: "https://hyperv.corp.local/".into(),
            timeout_seconds: Some(30),
            auth: AuthConfig {
                method: "negotiate".into(),
                username: "CORP\\svc-hyperv".into(),
                password: "secret".into(),
            },
            log_http: true,
            proxy: "http://proxy.corp.local:3128".into(),
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.timeout, Some(Duration::from_secs(30)));
        assert!(builder.log_http);
        let proxy = builder.proxy.as_ref().unwrap();
        assert_eq!(proxy.uri().host(), Some("proxy.corp.local"));
        assert_eq!(proxy.uri().port_u16(), Some(3128));
        match builder.auth {
            Auth::Negotiate(Credentials::Explicit(creds)) => {
                assert_eq!(creds.domain(), Some("CORP"));
                assert_eq!(creds.username(), "svc-hyperv");
            }
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn test_from_config_defaults() {
        let builder = ClientBuilder::from_config(&Config::default()).unwrap();
        assert_eq!(builder.timeout, Some(DEFAULT_TIMEOUT));
        assert!(builder.endpoint.is_none());
        assert!(matches!(builder.auth, Auth::None));
        assert!(builder.proxy.is_none());
    }

    #[test]
    fn test_from_config_invalid_proxy() {
        let config = Config {
            proxy: "socks5://proxy.corp.local:1080".into(),
            ..Default::default()
        };

        assert!(ClientBuilder::from_config(&config).unwrap_err().is_builder());
    }

    #[test]
    fn test_from_config_bearer_requires_token() {
        let config = Config {
            auth: AuthConfig {
                method: "bearer".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(ClientBuilder::from_config(&config).unwrap_err().is_builder());
    }
}
