// src/auth/impersonate.rs

//! Per-request impersonation of an explicitly configured account.
//!
//! Impersonation is a property of an OS thread, not of the process. Each
//! request is therefore moved onto a blocking-pool thread and the inner
//! service's future is driven to completion there with
//! [`Handle::block_on`], so the whole handshake runs under the assumed
//! identity and no other request ever observes it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use tokio::runtime::Handle;
use tower::{Layer, ServiceExt};
use tower_service::Service;

use super::ImpersonationCredentials;
use crate::body::Body;
use crate::error::{self, BoxError};
use crate::Result;

/// How the logon subsystem validates the credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogonKind {
    /// A full interactive logon, suited to services on the local machine.
    Interactive,
    /// Clone the caller's token and use the credentials only for outbound
    /// network authentication.
    NewCredentials,
}

/// Access to the operating system's logon and impersonation calls.
pub trait LogonProvider: Send + Sync + 'static {
    /// A logon session handle, closed when dropped.
    type Token;

    fn logon(
        &self,
        credentials: &ImpersonationCredentials,
        kind: LogonKind,
    ) -> std::result::Result<Self::Token, BoxError>;

    /// Make the calling thread act as the token's user.
    fn impersonate(&self, token: &Self::Token) -> std::result::Result<(), BoxError>;

    /// Return the calling thread to the process identity.
    fn revert(&self) -> std::result::Result<(), BoxError>;
}

/// Log on, trying an interactive logon first and a new-credentials logon
/// second. There is no fallback to the ambient identity.
fn logon<L: LogonProvider>(provider: &L, credentials: &ImpersonationCredentials) -> Result<L::Token> {
    match provider.logon(credentials, LogonKind::Interactive) {
        Ok(token) => Ok(token),
        Err(e) => {
            log::debug!(
                "interactive logon for {} failed ({}), retrying with new credentials",
                credentials,
                e
            );
            provider
                .logon(credentials, LogonKind::NewCredentials)
                .map_err(error::logon)
        }
    }
}

/// An impersonated identity on the current thread.
///
/// Dropping the guard reverts the thread and then closes the logon token,
/// including during unwinding.
struct Impersonation<'a, L: LogonProvider> {
    provider: &'a L,
    token: Option<L::Token>,
    active: bool,
}

impl<'a, L: LogonProvider> Impersonation<'a, L> {
    fn begin(provider: &'a L, credentials: &ImpersonationCredentials) -> Result<Self> {
        let token = logon(provider, credentials)?;
        provider.impersonate(&token).map_err(error::impersonate)?;

        Ok(Impersonation {
            provider,
            token: Some(token),
            active: true,
        })
    }

    /// Revert explicitly so a failure reaches the caller.
    fn end(mut self) -> Result<()> {
        self.active = false;
        let reverted = self.provider.revert();
        self.token.take();
        reverted.map_err(error::impersonate)
    }
}

impl<L: LogonProvider> Drop for Impersonation<'_, L> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.provider.revert() {
                log::error!("failed to revert impersonated thread identity: {}", e);
            }
        }
        self.token.take();
    }
}

/// Layer that runs each request as another account.
pub struct ImpersonateLayer<L> {
    provider: Arc<L>,
    credentials: Arc<ImpersonationCredentials>,
}

impl<L> ImpersonateLayer<L> {
    pub fn new(provider: L, credentials: ImpersonationCredentials) -> Self {
        Self {
            provider: Arc::new(provider),
            credentials: Arc::new(credentials),
        }
    }
}

impl<L> Clone for ImpersonateLayer<L> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

impl<L> fmt::Debug for ImpersonateLayer<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpersonateLayer")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl<S, L> Layer<S> for ImpersonateLayer<L> {
    type Service = ImpersonateService<S, L>;

    fn layer(&self, inner: S) -> Self::Service {
        ImpersonateService {
            inner,
            provider: self.provider.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// A transport that sends every request while impersonating a fixed account.
///
/// The request fails with a logon error, without being sent, when neither
/// logon kind accepts the credentials. Must be called from within a Tokio
/// runtime.
pub struct ImpersonateService<S, L> {
    inner: S,
    provider: Arc<L>,
    credentials: Arc<ImpersonationCredentials>,
}

impl<S: Clone, L> Clone for ImpersonateService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            provider: self.provider.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

impl<S: fmt::Debug, L> fmt::Debug for ImpersonateService<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpersonateService")
            .field("inner", &self.inner)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl<S, L, R> Service<Request<Body>> for ImpersonateService<S, L>
where
    S: Service<Request<Body>, Response = Response<R>> + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    S: Clone,
    L: LogonProvider,
    R: Send + 'static,
{
    type Response = Response<R>;
    type Error = crate::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<R>>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx).map_err(error::from_service)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();
        let credentials = self.credentials.clone();

        Box::pin(async move {
            let uri = request.uri().clone();
            let handle = Handle::try_current().map_err(|e| error::impersonate(e).with_uri(uri.clone()))?;

            // Dropping this future does not stop the pinned thread; it runs
            // the request to completion and reverts before it is released.
            tokio::task::spawn_blocking(move || {
                execute_impersonated(&handle, &*provider, &credentials, inner, request)
            })
            .await
            .map_err(|e| error::impersonate(e).with_uri(uri))?
        })
    }
}

fn execute_impersonated<S, L, R>(
    handle: &Handle,
    provider: &L,
    credentials: &ImpersonationCredentials,
    mut inner: S,
    request: Request<Body>,
) -> Result<Response<R>>
where
    S: Service<Request<Body>, Response = Response<R>>,
    S::Error: Into<BoxError>,
    L: LogonProvider,
{
    let uri = request.uri().clone();
    let impersonation =
        Impersonation::begin(provider, credentials).map_err(|e| e.with_uri(uri.clone()))?;

    log::debug!("sending {} {} as {}", request.method(), uri, credentials);

    let result = handle.block_on(async move {
        inner
            .ready()
            .await
            .map_err(error::from_service)?
            .call(request)
            .await
            .map_err(error::from_service)
    });

    impersonation.end().map_err(|e| e.with_uri(uri))?;
    result
}
