// src/transport.rs

//! The base transport and the layers wrapped directly around it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::uri::Scheme;
use http::{header, HeaderValue, Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use tokio::time::Instant;
use tower::Layer;
use tower_service::Service;

use crate::body::Body;
use crate::connect::ProxyConnector;
use crate::error;
use crate::proxy::Proxy;
use crate::Result;

#[cfg(feature = "default-tls")]
type Connector = hyper_rustls::HttpsConnector<ProxyConnector>;
#[cfg(not(feature = "default-tls"))]
type Connector = ProxyConnector;

/// The instant by which a request, every authentication leg included, must
/// have completed. Stored in the request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Deadline(pub(crate) Instant);

/// Sends one request over a pooled hyper connection.
///
/// Honors the request [`Deadline`]: a leg still in flight when it passes is
/// abandoned with a timeout error.
#[derive(Clone)]
pub struct HttpTransport {
    client: HyperClient<Connector, Body>,
    proxy_auth: Option<HeaderValue>,
}

impl HttpTransport {
    pub fn new() -> Result<HttpTransport> {
        HttpTransport::with_proxy(None)
    }

    /// A transport that routes every connection through `proxy`.
    pub fn with_proxy(proxy: Option<Proxy>) -> Result<HttpTransport> {
        let proxy_auth = proxy.as_ref().and_then(|p| p.basic_auth().cloned());
        let http = ProxyConnector::new(proxy);

        #[cfg(feature = "default-tls")]
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        #[cfg(not(feature = "default-tls"))]
        let connector = http;

        let client = HyperClient::builder(TokioExecutor::new()).build(connector);

        Ok(HttpTransport { client, proxy_auth })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("proxy_auth", &self.proxy_auth.is_some())
            .finish_non_exhaustive()
    }
}

impl Service<Request<Body>> for HttpTransport {
    type Response = Response<Incoming>;
    type Error = crate::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Incoming>>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // a CONNECT tunnel authenticates itself, forwarded requests carry it
        if let Some(auth) = &self.proxy_auth {
            if request.uri().scheme() != Some(&Scheme::HTTPS) {
                request
                    .headers_mut()
                    .entry(header::PROXY_AUTHORIZATION)
                    .or_insert_with(|| auth.clone());
            }
        }

        let deadline = request.extensions().get::<Deadline>().copied();
        let uri = request.uri().clone();
        let pending = self.client.request(request);

        Box::pin(async move {
            let result = match deadline {
                Some(Deadline(at)) => tokio::time::timeout_at(at, pending)
                    .await
                    .map_err(|_| error::timeout().with_uri(uri.clone()))?,
                None => pending.await,
            };

            result.map_err(|e| error::transport(e).with_uri(uri))
        })
    }
}

/// Logs every request and response that passes through at debug level.
///
/// Placed directly above the base transport it shows each authentication
/// leg. Header values are never logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHttpLayer;

impl<S> Layer<S> for LogHttpLayer {
    type Service = LogHttp<S>;

    fn layer(&self, inner: S) -> LogHttp<S> {
        LogHttp { inner }
    }
}

#[derive(Clone, Debug)]
pub struct LogHttp<S> {
    inner: S,
}

impl<S, B> Service<Request<Body>> for LogHttp<S>
where
    S: Service<Request<Body>, Response = Response<B>>,
    S::Error: fmt::Display + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<B>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Response<B>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().clone();
        let uri = request.uri().clone();

        log::debug!(
            "--> {} {} (body: {}, authorization: {})",
            method,
            uri,
            request
                .body()
                .content_length()
                .map_or_else(|| "streaming".to_owned(), |len| format!("{} bytes", len)),
            request.headers().contains_key(http::header::AUTHORIZATION),
        );

        let pending = self.inner.call(request);
        Box::pin(async move {
            let result = pending.await;
            match &result {
                Ok(response) => log::debug!("<-- {} {} {}", response.status(), method, uri),
                Err(e) => log::debug!("<-- {} {} failed: {}", method, uri, e),
            }
            result
        })
    }
}
