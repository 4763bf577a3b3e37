// src/auth/mod.rs

//! Authentication layers for HTTP Negotiate (Kerberos/SPNEGO/NTLM) support.
//!
//! [`NegotiateLayer`] answers `WWW-Authenticate: Negotiate` challenges with
//! tokens from a [`SecurityProvider`]. [`ImpersonateLayer`] runs the inner
//! service, handshake included, while the calling OS thread impersonates
//! another account obtained from a [`LogonProvider`].
//!
//! The native providers (Windows SSPI and `LogonUserW`) are selected at
//! compile time by the [`platform`] module.

use std::fmt;

mod context;
mod impersonate;
mod negotiate;
pub mod platform;

#[cfg(windows)]
mod logon;
#[cfg(windows)]
mod sspi;

pub use self::context::{SecurityContext, SecurityProvider, Step};
pub use self::impersonate::{ImpersonateLayer, ImpersonateService, LogonKind, LogonProvider};
pub use self::negotiate::{derive_spn, NegotiateLayer, NegotiateService, MAX_ROUNDTRIPS};

#[cfg(windows)]
pub use self::logon::{LogonToken, Win32Logon};
#[cfg(windows)]
pub use self::sspi::{Sspi, SspiContext};

/// Which identity the Negotiate handshake runs as.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// The identity of the calling process or thread.
    CurrentUser,

    /// Log on as another account and impersonate it for each request.
    Explicit(ImpersonationCredentials),
}

/// An account to impersonate: optional domain, user name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct ImpersonationCredentials {
    domain: Option<String>,
    username: String,
    password: String,
}

impl ImpersonationCredentials {
    /// Build credentials from a `DOMAIN\user` or bare user name.
    ///
    /// The name is split on the first backslash. Without one (or with a
    /// leading backslash) no domain is passed to the logon call, which also
    /// covers `user@REALM` principal names.
    pub fn new(username: impl AsRef<str>, password: impl Into<String>) -> Self {
        let (domain, username) = split_domain_user(username.as_ref());
        Self {
            domain: domain.map(str::to_owned),
            username: username.to_owned(),
            password: password.into(),
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ImpersonationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpersonationCredentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ImpersonationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}\\{}", domain, self.username),
            None => f.write_str(&self.username),
        }
    }
}

fn split_domain_user(input: &str) -> (Option<&str>, &str) {
    match input.find('\\') {
        Some(i) if i > 0 => (Some(&input[..i]), &input[i + 1..]),
        _ => (None, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_domain_user() {
        assert_eq!(split_domain_user("CORP\\svc-hyperv"), (Some("CORP"), "svc-hyperv"));
        assert_eq!(split_domain_user("svc-hyperv"), (None, "svc-hyperv"));
        assert_eq!(split_domain_user("svc@CORP.EXAMPLE.COM"), (None, "svc@CORP.EXAMPLE.COM"));
        assert_eq!(split_domain_user("\\svc"), (None, "\\svc"));
        assert_eq!(split_domain_user("CORP\\sub\\svc"), (Some("CORP"), "sub\\svc"));
    }

    #[test]
    fn test_credentials_redact_password() {
        let creds = ImpersonationCredentials::new("CORP\\svc-hyperv", "hunter2");
        assert_eq!(creds.domain(), Some("CORP"));
        assert_eq!(creds.username(), "svc-hyperv");
        assert_eq!(creds.password(), "hunter2");
        assert_eq!(creds.to_string(), "CORP\\svc-hyperv");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
