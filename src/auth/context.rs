// src/auth/context.rs

//! Capability traits for client-side security-context negotiation.

use crate::error::BoxError;

/// The outcome of feeding a server token into a [`SecurityContext`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Step {
    /// The context considers the exchange finished on its side.
    pub complete: bool,
    /// Token to send to the server on the next leg, if any.
    pub token: Option<Vec<u8>>,
}

/// Per-handshake negotiation state.
///
/// A context belongs to exactly one request. Dropping it releases whatever
/// the security subsystem holds for it.
pub trait SecurityContext: Send {
    /// Advance the exchange with the token the server sent on the last leg.
    fn step(&mut self, server_token: Option<&[u8]>) -> Result<Step, BoxError>;
}

/// Creates client security contexts for the identity of the calling thread.
pub trait SecurityProvider: Send + Sync + 'static {
    type Context: SecurityContext;

    /// Start a handshake with the service named by `spn`.
    ///
    /// Returns the context and the step for the first authenticated leg,
    /// which is produced without any input from the server. That step may
    /// already be complete.
    fn acquire(&self, spn: &str) -> Result<(Self::Context, Step), BoxError>;
}
