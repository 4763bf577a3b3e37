// tests/support/mock.rs

//! Scripted stand-ins for the security subsystem, the logon subsystem and
//! the base transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use http::{header, Request, Response};
use http_body_util::{BodyExt, Full};
use negotiate_http::auth::{
    ImpersonationCredentials, LogonKind, LogonProvider, SecurityContext, SecurityProvider, Step,
};
use negotiate_http::{Body, BoxError};
use tower::util::BoxCloneSyncService;

pub const INITIAL_TOKEN: &[u8] = b"initial-token";

// ===== security provider =====

#[derive(Default)]
struct ProviderState {
    acquired: Mutex<Vec<String>>,
    released: AtomicUsize,
    inputs: Mutex<Vec<Option<Vec<u8>>>>,
    script: Mutex<Vec<Step>>,
    initial: Option<Step>,
    fail_acquire: bool,
    fail_step: bool,
}

/// A provider whose contexts answer `step` from a script.
///
/// Once the script runs out every step yields a fresh, incomplete token.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<ProviderState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Step>) -> Self {
        let provider = Self::default();
        *provider.state.script.lock().unwrap() = script;
        provider
    }

    /// A provider whose contexts start with `initial` instead of an
    /// incomplete [`INITIAL_TOKEN`].
    pub fn with_initial(initial: Step) -> Self {
        Self {
            state: Arc::new(ProviderState {
                initial: Some(initial),
                ..Default::default()
            }),
        }
    }

    pub fn failing_acquire() -> Self {
        Self {
            state: Arc::new(ProviderState {
                fail_acquire: true,
                ..Default::default()
            }),
        }
    }

    pub fn failing_step() -> Self {
        Self {
            state: Arc::new(ProviderState {
                fail_step: true,
                ..Default::default()
            }),
        }
    }

    /// SPNs passed to `acquire`.
    pub fn acquired(&self) -> Vec<String> {
        self.state.acquired.lock().unwrap().clone()
    }

    /// Contexts dropped so far.
    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Server tokens fed into `step`, in order.
    pub fn inputs(&self) -> Vec<Option<Vec<u8>>> {
        self.state.inputs.lock().unwrap().clone()
    }
}

pub struct MockContext {
    state: Arc<ProviderState>,
    steps: usize,
}

impl SecurityContext for MockContext {
    fn step(&mut self, server_token: Option<&[u8]>) -> Result<Step, BoxError> {
        self.state
            .inputs
            .lock()
            .unwrap()
            .push(server_token.map(<[u8]>::to_vec));

        if self.state.fail_step {
            return Err("SEC_E_INVALID_TOKEN".into());
        }

        let scripted = self.state.script.lock().unwrap().get(self.steps).cloned();
        self.steps += 1;

        Ok(scripted.unwrap_or_else(|| Step {
            complete: false,
            token: Some(format!("client-token-{}", self.steps).into_bytes()),
        }))
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl SecurityProvider for MockProvider {
    type Context = MockContext;

    fn acquire(&self, spn: &str) -> Result<(MockContext, Step), BoxError> {
        self.state.acquired.lock().unwrap().push(spn.to_owned());

        if self.state.fail_acquire {
            return Err("SEC_E_NO_CREDENTIALS".into());
        }

        let context = MockContext {
            state: self.state.clone(),
            steps: 0,
        };
        let first = self.state.initial.clone().unwrap_or_else(|| Step {
            complete: false,
            token: Some(INITIAL_TOKEN.to_vec()),
        });
        Ok((context, first))
    }
}

// ===== logon provider =====

#[derive(Default)]
struct LogonState {
    identities: Mutex<HashMap<ThreadId, String>>,
    attempts: Mutex<Vec<LogonKind>>,
    rejected: Vec<LogonKind>,
    open_tokens: AtomicUsize,
    fail_impersonate: bool,
    fail_revert: bool,
}

/// Tracks the impersonated identity of every thread in a shared map.
#[derive(Clone, Default)]
pub struct MockLogon {
    state: Arc<LogonState>,
}

impl MockLogon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject logons of the given kinds.
    pub fn rejecting(rejected: Vec<LogonKind>) -> Self {
        Self::with(LogonState {
            rejected,
            ..Default::default()
        })
    }

    pub fn failing_impersonate() -> Self {
        Self::with(LogonState {
            fail_impersonate: true,
            ..Default::default()
        })
    }

    pub fn failing_revert() -> Self {
        Self::with(LogonState {
            fail_revert: true,
            ..Default::default()
        })
    }

    fn with(state: LogonState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// The identity the calling thread currently runs as, if impersonating.
    pub fn current_identity(&self) -> Option<String> {
        self.state
            .identities
            .lock()
            .unwrap()
            .get(&thread::current().id())
            .cloned()
    }

    /// Number of threads still impersonating.
    pub fn impersonating(&self) -> usize {
        self.state.identities.lock().unwrap().len()
    }

    pub fn attempts(&self) -> Vec<LogonKind> {
        self.state.attempts.lock().unwrap().clone()
    }

    /// Logon tokens not yet released.
    pub fn open_tokens(&self) -> usize {
        self.state.open_tokens.load(Ordering::SeqCst)
    }
}

pub struct MockToken {
    user: String,
    state: Arc<LogonState>,
}

impl Drop for MockToken {
    fn drop(&mut self) {
        self.state.open_tokens.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LogonProvider for MockLogon {
    type Token = MockToken;

    fn logon(
        &self,
        credentials: &ImpersonationCredentials,
        kind: LogonKind,
    ) -> Result<MockToken, BoxError> {
        self.state.attempts.lock().unwrap().push(kind);

        if self.state.rejected.contains(&kind) {
            return Err(format!("{:?} logon rejected for {}", kind, credentials).into());
        }

        self.state.open_tokens.fetch_add(1, Ordering::SeqCst);
        Ok(MockToken {
            user: credentials.to_string(),
            state: self.state.clone(),
        })
    }

    fn impersonate(&self, token: &MockToken) -> Result<(), BoxError> {
        if self.state.fail_impersonate {
            return Err("ERROR_CANNOT_IMPERSONATE".into());
        }

        self.state
            .identities
            .lock()
            .unwrap()
            .insert(thread::current().id(), token.user.clone());
        Ok(())
    }

    fn revert(&self) -> Result<(), BoxError> {
        self.state
            .identities
            .lock()
            .unwrap()
            .remove(&thread::current().id());

        if self.state.fail_revert {
            return Err("RevertToSelf failed".into());
        }
        Ok(())
    }
}

// ===== base transport =====

/// What the base transport saw for one send.
#[derive(Clone, Debug)]
pub struct Sent {
    pub authorization: Option<String>,
    pub content_length: Option<String>,
    pub body: Bytes,
    pub thread: ThreadId,
}

pub type BaseService = BoxCloneSyncService<Request<Body>, Response<Full<Bytes>>, BoxError>;

#[derive(Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Sent>>>);

impl SentLog {
    pub fn all(&self) -> Vec<Sent> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.all().into_iter().map(|sent| sent.authorization).collect()
    }
}

/// A base transport that records every request and answers with
/// `handler(index_of_send, &sent)`.
pub fn recording<F>(handler: F) -> (BaseService, SentLog)
where
    F: Fn(usize, &Sent) -> Result<Response<Full<Bytes>>, BoxError> + Send + Sync + 'static,
{
    let log = SentLog::default();
    let handler = Arc::new(handler);

    let sent_log = log.clone();
    let service = tower::service_fn(move |req: Request<Body>| {
        let log = sent_log.clone();
        let handler = handler.clone();
        let thread = thread::current().id();

        async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();

            let header_str = |name: header::HeaderName| {
                parts
                    .headers
                    .get(name)
                    .map(|v| v.to_str().unwrap().to_owned())
            };

            let sent = Sent {
                authorization: header_str(header::AUTHORIZATION),
                content_length: header_str(header::CONTENT_LENGTH),
                body,
                thread,
            };

            let index = {
                let mut log = log.0.lock().unwrap();
                log.push(sent.clone());
                log.len() - 1
            };

            handler(index, &sent)
        }
    });

    (BoxCloneSyncService::new(service), log)
}

pub fn respond(status: u16, challenge: Option<&str>, body: &'static str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    if let Some(challenge) = challenge {
        builder = builder.header(header::WWW_AUTHENTICATE, challenge);
    }
    builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
}

/// `Negotiate <base64(token)>`.
pub fn negotiate_header(token: &[u8]) -> String {
    use base64::Engine as _;
    format!(
        "Negotiate {}",
        base64::engine::general_purpose::STANDARD.encode(token)
    )
}
