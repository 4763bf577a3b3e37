// src/config.rs

//! Plain-data client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error;

/// Timeout applied when a configuration does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Client settings, typically filled from a provider or CLI configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Base URL that relative request paths are resolved against.
    pub endpoint: String,
    /// Whole-request timeout in seconds, all authentication legs included.
    /// `None` means [`DEFAULT_TIMEOUT`].
    pub timeout_seconds: Option<u64>,
    pub auth: AuthConfig,
    /// Log each request and response at debug level.
    pub log_http: bool,
    /// Optional HTTP proxy URL. Empty means connect directly.
    pub proxy: String,
}

/// The `auth` block: `method` is one of `none`, `bearer` or `negotiate`.
///
/// For `bearer` the password is the token. For `negotiate` a non-empty
/// username selects impersonation of that account.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub method: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthMethod {
    #[default]
    None,
    Bearer,
    Negotiate,
}

impl FromStr for AuthMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = s.trim();
        if method.is_empty() || method.eq_ignore_ascii_case("none") {
            Ok(AuthMethod::None)
        } else if method.eq_ignore_ascii_case("bearer") {
            Ok(AuthMethod::Bearer)
        } else if method.eq_ignore_ascii_case("negotiate") {
            Ok(AuthMethod::Negotiate)
        } else {
            Err(error::builder(format!("unknown auth method {:?}", method)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_method() {
        assert_eq!("".parse::<AuthMethod>().unwrap(), AuthMethod::None);
        assert_eq!("none".parse::<AuthMethod>().unwrap(), AuthMethod::None);
        assert_eq!(" Bearer ".parse::<AuthMethod>().unwrap(), AuthMethod::Bearer);
        assert_eq!("NEGOTIATE".parse::<AuthMethod>().unwrap(), AuthMethod::Negotiate);
        assert!("kerberos".parse::<AuthMethod>().unwrap_err().is_builder());
    }

    #[test]
    fn test_auth_config_redacts_password() {
        let auth = AuthConfig {
            method: "negotiate".into(),
            username: "CORP\\svc".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
