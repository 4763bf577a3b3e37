// src/auth/platform.rs

//! Compile-time selection of the security subsystem.
//!
//! On Windows the layers returned here negotiate through SSPI and
//! impersonate through `LogonUserW`. Elsewhere they are
//! [`Identity`](tower::layer::util::Identity) layers: requests go straight to
//! the wrapped transport with no authentication and no impersonation.

use super::ImpersonationCredentials;

/// Whether this build has a native security subsystem.
pub const NATIVE: bool = cfg!(windows);

/// The Negotiate layer for this platform.
#[cfg(windows)]
pub type PlatformNegotiateLayer = super::NegotiateLayer<super::Sspi>;

/// The Negotiate layer for this platform.
#[cfg(not(windows))]
pub type PlatformNegotiateLayer = tower::layer::util::Identity;

/// The impersonation layer for this platform.
#[cfg(windows)]
pub type PlatformImpersonateLayer = super::ImpersonateLayer<super::Win32Logon>;

/// The impersonation layer for this platform.
#[cfg(not(windows))]
pub type PlatformImpersonateLayer = tower::layer::util::Identity;

#[cfg(windows)]
pub fn negotiate_layer() -> PlatformNegotiateLayer {
    super::NegotiateLayer::new(super::Sspi)
}

#[cfg(not(windows))]
pub fn negotiate_layer() -> PlatformNegotiateLayer {
    log::debug!("Negotiate authentication is not available on this platform");
    tower::layer::util::Identity::new()
}

#[cfg(windows)]
pub fn impersonate_layer(credentials: ImpersonationCredentials) -> PlatformImpersonateLayer {
    super::ImpersonateLayer::new(super::Win32Logon, credentials)
}

#[cfg(not(windows))]
pub fn impersonate_layer(credentials: ImpersonationCredentials) -> PlatformImpersonateLayer {
    log::warn!(
        "impersonation is not supported on this platform, requests for {} use the ambient identity",
        credentials
    );
    tower::layer::util::Identity::new()
}
