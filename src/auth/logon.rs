// src/auth/logon.rs

//! Native logon and thread impersonation through the Win32 API.

use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{
    ImpersonateLoggedOnUser, LogonUserW, RevertToSelf, LOGON32_LOGON, LOGON32_LOGON_INTERACTIVE,
    LOGON32_LOGON_NEW_CREDENTIALS, LOGON32_PROVIDER_DEFAULT,
};

use super::impersonate::{LogonKind, LogonProvider};
use super::ImpersonationCredentials;
use crate::error::BoxError;

/// `LogonUserW` / `ImpersonateLoggedOnUser` / `RevertToSelf`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Win32Logon;

/// A primary token returned by `LogonUserW`.
#[derive(Debug)]
pub struct LogonToken(HANDLE);

impl Drop for LogonToken {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn logon_type(kind: LogonKind) -> LOGON32_LOGON {
    match kind {
        LogonKind::Interactive => LOGON32_LOGON_INTERACTIVE,
        LogonKind::NewCredentials => LOGON32_LOGON_NEW_CREDENTIALS,
    }
}

impl LogonProvider for Win32Logon {
    type Token = LogonToken;

    fn logon(
        &self,
        credentials: &ImpersonationCredentials,
        kind: LogonKind,
    ) -> Result<LogonToken, BoxError> {
        let username = HSTRING::from(credentials.username());
        let password = HSTRING::from(credentials.password());
        let domain = credentials.domain().map(HSTRING::from);
        let domain_ptr = domain
            .as_ref()
            .map_or(PCWSTR::null(), |domain| PCWSTR(domain.as_ptr()));

        let mut token = HANDLE::default();
        unsafe {
            LogonUserW(
                &username,
                domain_ptr,
                &password,
                logon_type(kind),
                LOGON32_PROVIDER_DEFAULT,
                &mut token,
            )?;
        }

        Ok(LogonToken(token))
    }

    fn impersonate(&self, token: &LogonToken) -> Result<(), BoxError> {
        unsafe { ImpersonateLoggedOnUser(token.0)? };
        Ok(())
    }

    fn revert(&self) -> Result<(), BoxError> {
        unsafe { RevertToSelf()? };
        Ok(())
    }
}
