// src/lib.rs

#![deny(missing_debug_implementations)]

//! # negotiate-http
//!
//! An HTTP client middleware that transparently answers `Negotiate`
//! (Kerberos/SPNEGO) challenges, optionally while impersonating an explicitly
//! configured account for the duration of each request.
//!
//! The pieces are ordinary [`tower`] layers stacked on a hyper transport:
//!
//! - [`HttpTransport`] sends one request over a pooled connection.
//! - [`auth::NegotiateLayer`] replays the request with successive
//!   `Authorization: Negotiate` tokens while the server challenges.
//! - [`auth::ImpersonateLayer`] runs the whole handshake on one OS thread that
//!   impersonates another account, then reverts.
//!
//! [`Client`] wires them together from a [`ClientBuilder`] or a [`Config`]:
//!
//! ```no_run
//! # async fn run() -> negotiate_http::Result<()> {
//! let client = negotiate_http::Client::builder()
//!     .endpoint("https://hyperv.corp.example.com/api/")
//!     .negotiate()
//!     .build()?;
//!
//! let response = client.get("vms").await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! Native authentication is only available on Windows. On other platforms
//! the layers selected by [`auth::platform`] pass requests through
//! unchanged.

pub mod auth;
mod body;
mod client;
mod config;
mod connect;
mod error;
mod proxy;
mod transport;

pub use self::body::{make_replayable, Body};
pub use self::client::{Client, ClientBuilder};
pub use self::config::{AuthConfig, AuthMethod, Config, DEFAULT_TIMEOUT};
pub use self::error::{BoxError, Error, Result};
pub use self::proxy::Proxy;
pub use self::transport::{HttpTransport, LogHttp, LogHttpLayer};
