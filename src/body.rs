// src/body.rs

//! Request bodies that can be replayed across authentication legs.
//!
//! A [`Body`] is either *reusable* (backed by a buffered [`Bytes`], so
//! [`Body::try_clone`] always succeeds) or *streaming* (any boxed
//! `http_body::Body`, readable exactly once). The Negotiate handshake resends
//! the same request several times, so streaming bodies are captured once by
//! [`make_replayable`] before the first send.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{header, HeaderValue, Request};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;

use crate::error::BoxError;

/// An outbound request body.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Reusable(Bytes),
    Streaming(BoxBody<Bytes, BoxError>),
}

impl Body {
    /// An empty, reusable body.
    pub fn empty() -> Body {
        Body::reusable(Bytes::new())
    }

    pub(crate) fn reusable(chunk: Bytes) -> Body {
        Body {
            inner: Inner::Reusable(chunk),
        }
    }

    /// Wrap any `http_body::Body` as a streaming body.
    ///
    /// A streaming body cannot be cloned. When it is sent through the
    /// Negotiate transport it is read to the end once and buffered.
    pub fn wrap<B>(inner: B) -> Body
    where
        B: HttpBody + Send + Sync + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<BoxError>,
    {
        let boxed = inner
            .map_frame(|frame| frame.map_data(Into::<Bytes>::into))
            .map_err(Into::<BoxError>::into)
            .boxed();

        Body {
            inner: Inner::Streaming(boxed),
        }
    }

    /// Returns the buffered bytes of a reusable body.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(bytes.as_ref()),
            Inner::Streaming(..) => None,
        }
    }

    /// Returns a fresh body over the same bytes, or `None` for a streaming
    /// body.
    pub fn try_clone(&self) -> Option<Body> {
        match &self.inner {
            Inner::Reusable(chunk) => Some(Body::reusable(chunk.clone())),
            Inner::Streaming(..) => None,
        }
    }

    /// Whether [`Body::try_clone`] will succeed.
    pub fn is_replayable(&self) -> bool {
        matches!(self.inner, Inner::Reusable(..))
    }

    pub(crate) fn content_length(&self) -> Option<u64> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(bytes.len() as u64),
            Inner::Streaming(body) => body.size_hint().exact(),
        }
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Reusable(bytes) => f.debug_tuple("Body::Reusable").field(&bytes.len()).finish(),
            Inner::Streaming(..) => f.write_str("Body::Streaming(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body::reusable(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(vec: Vec<u8>) -> Body {
        Body::reusable(vec.into())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::reusable(s.into())
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::reusable(Bytes::from_static(s.as_bytes()))
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Inner::Reusable(bytes) => {
                let out = std::mem::take(bytes);
                if out.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(Frame::data(out))))
                }
            }
            Inner::Streaming(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Inner::Reusable(bytes) => bytes.is_empty(),
            Inner::Streaming(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Inner::Reusable(bytes) => SizeHint::with_exact(bytes.len() as u64),
            Inner::Streaming(body) => body.size_hint(),
        }
    }
}

/// Ensure the request body can be replayed on every authentication leg.
///
/// A reusable body is left untouched. A streaming body is read to the end
/// exactly once, the original stream is dropped, and the request gets a
/// reusable body over the buffered bytes with a matching `Content-Length`.
pub async fn make_replayable(req: Request<Body>) -> crate::Result<Request<Body>> {
    if req.body().is_replayable() {
        return Ok(req);
    }

    let (mut parts, body) = req.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| crate::error::body(e).with_uri(parts.uri.clone()))?
        .to_bytes();

    log::trace!("buffered {} byte request body for replay", bytes.len());

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    Ok(Request::from_parts(parts, Body::reusable(bytes)))
}

/// Snapshot a request: method, URI, version, headers, extensions and a fresh
/// body. Returns `None` if the body is not replayable.
pub(crate) fn try_clone_request(req: &Request<Body>) -> Option<Request<Body>> {
    let body = req.body().try_clone()?;

    let mut clone = Request::new(body);
    *clone.method_mut() = req.method().clone();
    *clone.uri_mut() = req.uri().clone();
    *clone.version_mut() = req.version();
    *clone.headers_mut() = req.headers().clone();
    *clone.extensions_mut() = req.extensions().clone();

    Some(clone)
}
