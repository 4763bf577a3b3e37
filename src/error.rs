// src/error.rs

use std::error::Error as StdError;
use std::fmt;

use http::Uri;

/// A `Result` alias where the `Err` case is `negotiate_http::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error returned by transports and security providers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The errors that may occur while sending an authenticated request.
///
/// Note that a server refusing authentication is *not* an error: the final
/// `401 Unauthorized` response is handed back to the caller.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    uri: Option<Uri>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Builder,
    Transport,
    Timeout,
    Body,
    Negotiate,
    Logon,
    Impersonate,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                uri: None,
            }),
        }
    }

    /// Returns the URI of the request this error is related to, if known.
    pub fn uri(&self) -> Option<&Uri> {
        self.inner.uri.as_ref()
    }

    pub(crate) fn with_uri(mut self, uri: Uri) -> Self {
        self.inner.uri = Some(uri);
        self
    }

    /// Returns true if the error came from building a client or a request.
    pub fn is_builder(&self) -> bool {
        self.inner.kind == Kind::Builder
    }

    /// Returns true if the base transport failed to exchange a request.
    pub fn is_transport(&self) -> bool {
        self.inner.kind == Kind::Transport
    }

    /// Returns true if the request deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        self.inner.kind == Kind::Timeout
    }

    /// Returns true if reading a request body failed.
    pub fn is_body(&self) -> bool {
        self.inner.kind == Kind::Body
    }

    /// Returns true if the security provider failed during the handshake.
    pub fn is_negotiate(&self) -> bool {
        self.inner.kind == Kind::Negotiate
    }

    /// Returns true if logging on with explicit credentials failed.
    pub fn is_logon(&self) -> bool {
        self.inner.kind == Kind::Logon
    }

    /// Returns true if assuming or reverting an impersonated identity failed.
    pub fn is_impersonate(&self) -> bool {
        self.inner.kind == Kind::Impersonate
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("negotiate_http::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref uri) = self.inner.uri {
            builder.field("uri", uri);
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Transport => f.write_str("error sending request")?,
            Kind::Timeout => f.write_str("request deadline elapsed")?,
            Kind::Body => f.write_str("request body error")?,
            Kind::Negotiate => f.write_str("negotiate authentication error")?,
            Kind::Logon => f.write_str("logon failed")?,
            Kind::Impersonate => f.write_str("impersonation error")?,
        }

        if let Some(uri) = &self.inner.uri {
            write!(f, " for uri ({uri})")?;
        }

        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

/// Convert an error produced by a wrapped service.
///
/// Errors that already are a `negotiate_http::Error` pass through unchanged,
/// anything else came from the underlying transport.
pub(crate) fn from_service<E: Into<BoxError>>(e: E) -> Error {
    match e.into().downcast::<Error>() {
        Ok(err) => *err,
        Err(other) => transport(other),
    }
}

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder, Some(e))
}

pub(crate) fn transport<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transport, Some(e))
}

pub(crate) fn timeout() -> Error {
    Error::new(Kind::Timeout, None::<BoxError>)
}

pub(crate) fn body<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Body, Some(e))
}

pub(crate) fn negotiate<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiate, Some(e))
}

pub(crate) fn logon<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Logon, Some(e))
}

pub(crate) fn impersonate<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Impersonate, Some(e))
}
