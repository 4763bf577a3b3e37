// src/auth/sspi.rs

//! Windows SSPI (Security Support Provider Interface) wrapper for the
//! Negotiate package.
//!
//! Credentials are acquired for the identity of the calling thread, so a
//! thread that impersonates another account negotiates as that account.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use windows::core::{w, Error as WinError, PCWSTR};
use windows::Win32::Foundation::{
    SEC_E_OK, SEC_I_COMPLETE_AND_CONTINUE, SEC_I_COMPLETE_NEEDED,
};
use windows::Win32::Security::Authentication::Identity::{
    AcquireCredentialsHandleW, CompleteAuthToken, DeleteSecurityContext, FreeContextBuffer,
    FreeCredentialsHandle, InitializeSecurityContextW, SecBuffer, SecBufferDesc,
    ISC_REQ_ALLOCATE_MEMORY, ISC_REQ_CONNECTION, SECBUFFER_TOKEN, SECBUFFER_VERSION,
    SECPKG_CRED_OUTBOUND, SECURITY_NATIVE_DREP,
};
use windows::Win32::Security::Credentials::SecHandle;

use super::context::{SecurityContext, SecurityProvider, Step};
use crate::error::BoxError;

/// The native `Negotiate` security package.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sspi;

impl SecurityProvider for Sspi {
    type Context = SspiContext;

    fn acquire(&self, spn: &str) -> Result<(SspiContext, Step), BoxError> {
        let credentials = CredentialsHandle::current_user()?;

        let mut ctx = SspiContext {
            handle: None,
            credentials,
            target: spn.encode_utf16().chain(Some(0)).collect(),
        };

        let step = ctx.initialize(None)?;
        Ok((ctx, step))
    }
}

/// Outbound credentials of the calling thread for the Negotiate package.
struct CredentialsHandle(SecHandle);

impl CredentialsHandle {
    fn current_user() -> Result<Self, BoxError> {
        let mut handle = SecHandle::default();

        unsafe {
            AcquireCredentialsHandleW(
                PCWSTR::null(),
                w!("Negotiate"),
                SECPKG_CRED_OUTBOUND,
                None,
                None,
                None,
                None,
                &mut handle,
                None,
            )?;
        }

        Ok(CredentialsHandle(handle))
    }
}

impl Drop for CredentialsHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeCredentialsHandle(&self.0);
        }
    }
}

/// A client security context for one handshake.
pub struct SspiContext {
    handle: Option<SecHandle>,
    credentials: CredentialsHandle,
    target: Vec<u16>,
}

impl SspiContext {
    fn initialize(&mut self, input: Option<&[u8]>) -> Result<Step, BoxError> {
        let mut input_buffer = SecBuffer {
            cbBuffer: input.map_or(0, |token| token.len() as u32),
            BufferType: SECBUFFER_TOKEN,
            pvBuffer: input.map_or(ptr::null_mut(), |token| token.as_ptr() as *mut c_void),
        };
        let input_desc = SecBufferDesc {
            ulVersion: SECBUFFER_VERSION,
            cBuffers: 1,
            pBuffers: &mut input_buffer,
        };

        let mut output_buffer = SecBuffer {
            cbBuffer: 0,
            BufferType: SECBUFFER_TOKEN,
            pvBuffer: ptr::null_mut(),
        };
        let mut output_desc = SecBufferDesc {
            ulVersion: SECBUFFER_VERSION,
            cBuffers: 1,
            pBuffers: &mut output_buffer,
        };

        let existing = self.handle;
        let mut new_handle = existing.unwrap_or_default();
        let mut attributes = 0u32;

        let status = unsafe {
            InitializeSecurityContextW(
                Some(&self.credentials.0 as *const SecHandle),
                existing.as_ref().map(|handle| handle as *const SecHandle),
                Some(self.target.as_ptr()),
                ISC_REQ_ALLOCATE_MEMORY | ISC_REQ_CONNECTION,
                0,
                SECURITY_NATIVE_DREP,
                input.map(|_| &input_desc as *const SecBufferDesc),
                0,
                Some(&mut new_handle as *mut SecHandle),
                Some(&mut output_desc as *mut SecBufferDesc),
                &mut attributes,
                None,
            )
        };

        if status.is_err() {
            take_output_token(&output_buffer);
            return Err(WinError::from(status).into());
        }
        self.handle = Some(new_handle);

        // must run before the output buffer is released
        let completed = if status == SEC_I_COMPLETE_NEEDED || status == SEC_I_COMPLETE_AND_CONTINUE {
            unsafe { CompleteAuthToken(&new_handle, &output_desc) }
        } else {
            Ok(())
        };

        let token = take_output_token(&output_buffer);
        completed?;

        Ok(Step {
            complete: status == SEC_E_OK || status == SEC_I_COMPLETE_NEEDED,
            token,
        })
    }
}

/// Copy the token SSPI allocated for us and hand the buffer back.
fn take_output_token(buffer: &SecBuffer) -> Option<Vec<u8>> {
    if buffer.pvBuffer.is_null() {
        return None;
    }

    let token = unsafe {
        std::slice::from_raw_parts(buffer.pvBuffer as *const u8, buffer.cbBuffer as usize).to_vec()
    };
    unsafe {
        let _ = FreeContextBuffer(buffer.pvBuffer);
    }

    Some(token).filter(|token| !token.is_empty())
}

impl fmt::Debug for SspiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SspiContext")
            .field("established", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl SecurityContext for SspiContext {
    fn step(&mut self, server_token: Option<&[u8]>) -> Result<Step, BoxError> {
        self.initialize(server_token)
    }
}

impl Drop for SspiContext {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe {
                let _ = DeleteSecurityContext(&handle);
            }
        }
    }
}
