// src/connect.rs

//! TCP connections for the base transport, direct or through a proxy.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::uri::Scheme;
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::ServiceExt;
use tower_service::Service;

use crate::error::BoxError;
use crate::proxy::Proxy;

type Connecting = Pin<Box<dyn Future<Output = Result<Conn, BoxError>> + Send>>;

/// Opens TCP connections, routing them through a [`Proxy`] when one is set.
///
/// `https` destinations behind a proxy get a `CONNECT` tunnel, which TLS is
/// then layered over. Any other destination is reached by connecting to the
/// proxy itself and marking the connection as proxied, so requests on it are
/// written in absolute form.
#[derive(Clone, Debug)]
pub(crate) struct ProxyConnector {
    http: HttpConnector,
    proxy: Option<Proxy>,
}

impl ProxyConnector {
    pub(crate) fn new(proxy: Option<Proxy>) -> ProxyConnector {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        ProxyConnector { http, proxy }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = Conn;
    type Error = BoxError;
    type Future = Connecting;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Connecting {
        let proxy = match &self.proxy {
            Some(proxy) => proxy,
            None => {
                let connecting = self.http.call(dst);
                return Box::pin(async move {
                    Ok::<_, BoxError>(Conn::new(connecting.await?, false))
                });
            }
        };

        if dst.scheme() == Some(&Scheme::HTTPS) {
            log::trace!("tunnelling to {} through {}", dst, proxy.uri());

            let mut tunnel = Tunnel::new(proxy.uri().clone(), self.http.clone());
            if let Some(auth) = proxy.basic_auth() {
                tunnel = tunnel.with_auth(auth.clone());
            }

            Box::pin(async move {
                let io = tunnel.oneshot(dst).await?;
                Ok::<_, BoxError>(Conn::new(io, false))
            })
        } else {
            let connecting = self.http.call(proxy.uri().clone());
            Box::pin(async move { Ok::<_, BoxError>(Conn::new(connecting.await?, true)) })
        }
    }
}

/// A connected stream that remembers whether its peer is a forwarding proxy.
pub(crate) struct Conn {
    inner: TokioIo<TcpStream>,
    proxied: bool,
}

impl Conn {
    fn new(inner: TokioIo<TcpStream>, proxied: bool) -> Conn {
        Conn { inner, proxied }
    }
}

impl Connection for Conn {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.proxied)
    }
}

impl Read for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Write for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}
