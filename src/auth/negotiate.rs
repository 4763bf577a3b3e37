// src/auth/negotiate.rs

//! HTTP Negotiate protocol implementation.
//!
//! Implements the client side of the HTTP "Negotiate" authentication scheme
//! (RFC 4559). A request is first sent as-is; when the server answers `401`
//! with a `Negotiate` challenge, the request is replayed with successive
//! `Authorization: Negotiate <token>` headers until the server stops
//! challenging or [`MAX_ROUNDTRIPS`] sends have been made.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::Engine as _;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use tower::{Layer, ServiceExt};
use tower_service::Service;

use super::context::{SecurityContext, SecurityProvider};
use crate::body::{make_replayable, try_clone_request, Body};
use crate::error::{self, BoxError};
use crate::Result;

/// Upper bound on sends for a single request, the unauthenticated first
/// send included.
pub const MAX_ROUNDTRIPS: usize = 5;

const SCHEME: &str = "Negotiate";

/// Derive the Service Principal Name (SPN) from a request URI.
///
/// For HTTP authentication, the SPN format is "HTTP/<hostname>". Loopback
/// hosts are replaced by the local machine name, since that is the name the
/// service account is registered under.
///
/// # Examples
/// ```
/// # use negotiate_http::auth::derive_spn;
/// let uri = "https://server.corp.com:8080/api".parse().unwrap();
/// assert_eq!(derive_spn(&uri).unwrap(), "HTTP/server.corp.com");
/// ```
pub fn derive_spn(uri: &Uri) -> Result<String> {
    let host = uri
        .host()
        .ok_or_else(|| error::negotiate("URI has no host for SPN").with_uri(uri.clone()))?;

    // `Uri::host` keeps the brackets around IPv6 literals
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if is_loopback(host) {
        if let Some(name) = local_hostname() {
            return Ok(format!("HTTP/{}", name));
        }
    }

    Ok(format!("HTTP/{}", host))
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1"
}

fn local_hostname() -> Option<String> {
    match whoami::fallible::hostname() {
        Ok(name) if !name.is_empty() => Some(name),
        Ok(_) => None,
        Err(e) => {
            log::debug!("could not resolve local host name for SPN: {}", e);
            None
        }
    }
}

/// A `Negotiate` challenge taken from `WWW-Authenticate`.
#[derive(Debug, PartialEq, Eq)]
struct Challenge {
    token: Option<Vec<u8>>,
}

/// Find the first `Negotiate` challenge among the `WWW-Authenticate` values.
///
/// A token that is not valid base64 is treated as absent.
fn parse_negotiate_challenge(headers: &HeaderMap) -> Option<Challenge> {
    for value in headers.get_all(http::header::WWW_AUTHENTICATE) {
        let Ok(value_str) = value.to_str() else {
            continue;
        };
        let trimmed = value_str.trim();

        let Some(rest) = strip_scheme(trimmed, SCHEME) else {
            continue;
        };

        let token_str = rest.trim();
        let token = if token_str.is_empty() {
            None
        } else {
            match base64::engine::general_purpose::STANDARD.decode(token_str) {
                Ok(decoded) if !decoded.is_empty() => Some(decoded),
                Ok(_) => None,
                Err(e) => {
                    log::debug!("ignoring malformed Negotiate token: {}", e);
                    None
                }
            }
        };

        return Some(Challenge { token });
    }

    None
}

/// Case-insensitively strip `scheme` from the front of a challenge.
fn strip_scheme<'a>(challenge: &'a str, scheme: &str) -> Option<&'a str> {
    let head = challenge.get(..scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }

    let rest = &challenge[scheme.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

fn authorization_value(token: &[u8]) -> Result<HeaderValue> {
    let token_base64 = base64::engine::general_purpose::STANDARD.encode(token);
    let mut value = HeaderValue::try_from(format!("{} {}", SCHEME, token_base64))
        .map_err(|_| error::negotiate("Invalid authorization header"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Layer that adds Negotiate authentication to a transport.
pub struct NegotiateLayer<P> {
    provider: Arc<P>,
}

impl<P> NegotiateLayer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<P> Clone for NegotiateLayer<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P> fmt::Debug for NegotiateLayer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiateLayer").finish_non_exhaustive()
    }
}

impl<S, P> Layer<S> for NegotiateLayer<P> {
    type Service = NegotiateService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        NegotiateService {
            inner,
            provider: self.provider.clone(),
        }
    }
}

/// A transport that transparently answers Negotiate challenges.
///
/// Responses other than a challenged `401` are returned untouched after a
/// single send. A server that keeps challenging sees at most
/// [`MAX_ROUNDTRIPS`] requests, the unauthenticated one included, after
/// which its last `401` is returned to the caller.
pub struct NegotiateService<S, P> {
    inner: S,
    provider: Arc<P>,
}

impl<S: Clone, P> Clone for NegotiateService<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl<S: fmt::Debug, P> fmt::Debug for NegotiateService<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiateService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, P, B> Service<Request<Body>> for NegotiateService<S, P>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    P: SecurityProvider,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Send,
{
    type Response = Response<B>;
    type Error = crate::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<B>>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx).map_err(error::from_service)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // keep the service that was driven to readiness
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();

        Box::pin(execute_with_negotiate(request, provider, inner))
    }
}

/// Execute a request with HTTP Negotiate authentication.
///
/// 1. Send the request without authentication
/// 2. If 401 with a Negotiate challenge, start a security context for the SPN
/// 3. Replay the request with each token until the server stops challenging
async fn execute_with_negotiate<S, P, B>(
    request: Request<Body>,
    provider: Arc<P>,
    mut inner: S,
) -> Result<Response<B>>
where
    S: Service<Request<Body>, Response = Response<B>>,
    S::Error: Into<BoxError>,
    P: SecurityProvider,
    B: HttpBody,
{
    let original_request = make_replayable(request).await?;
    let uri = original_request.uri().clone();

    // Send initial request without authentication
    let response = send(&mut inner, snapshot(&original_request)?).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    if parse_negotiate_challenge(response.headers()).is_none() {
        log::debug!("401 from {} carries no Negotiate challenge", uri);
        return Ok(response);
    }
    drain(response).await;

    let spn = derive_spn(&uri)?;
    log::debug!("Negotiate challenge from {}, using SPN {}", uri, spn);

    let (mut ctx, first) = provider
        .acquire(&spn)
        .map_err(|e| error::negotiate(e).with_uri(uri.clone()))?;

    let mut pending = Some(first);
    let mut input_token: Option<Vec<u8>> = None;
    let mut challenged: Option<Response<B>> = None;

    // leg 0 was the unauthenticated send above
    for leg in 1..MAX_ROUNDTRIPS {
        if let Some(previous) = challenged.take() {
            drain(previous).await;
        }

        let step = match pending.take() {
            Some(step) => step,
            None => ctx
                .step(input_token.as_deref())
                .map_err(|e| error::negotiate(e).with_uri(uri.clone()))?,
        };

        let mut auth_request = snapshot(&original_request)?;
        match step.token.as_deref() {
            Some(token) if !token.is_empty() => {
                auth_request
                    .headers_mut()
                    .insert(http::header::AUTHORIZATION, authorization_value(token)?);
            }
            _ => log::debug!("security context produced no token for leg {}", leg),
        }

        let response = send(&mut inner, auth_request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            log::debug!(
                "Negotiate exchange with {} ended with {} after {} leg(s)",
                spn,
                response.status(),
                leg + 1
            );
            return Ok(response);
        }

        input_token = parse_negotiate_challenge(response.headers()).and_then(|c| c.token);

        if step.complete && input_token.is_none() {
            log::debug!(
                "security context for {} is complete but the server still answers 401",
                spn
            );
            return Ok(response);
        }

        challenged = Some(response);
    }

    log::debug!("giving up on {} after {} sends", spn, MAX_ROUNDTRIPS);

    challenged.ok_or_else(|| error::negotiate("no Negotiate legs were sent").with_uri(uri))
}

fn snapshot(request: &Request<Body>) -> Result<Request<Body>> {
    try_clone_request(request).ok_or_else(|| {
        error::body("Request body is not replayable for Negotiate authentication")
            .with_uri(request.uri().clone())
    })
}

async fn send<S, B>(inner: &mut S, request: Request<Body>) -> Result<Response<B>>
where
    S: Service<Request<Body>, Response = Response<B>>,
    S::Error: Into<BoxError>,
{
    inner
        .ready()
        .await
        .map_err(error::from_service)?
        .call(request)
        .await
        .map_err(error::from_service)
}

/// Read a challenged response to the end so its connection can be reused.
async fn drain<B: HttpBody>(response: Response<B>) {
    if response.into_body().collect().await.is_err() {
        log::trace!("failed to drain 401 response body");
    }
}
