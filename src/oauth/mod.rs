pub mod endpoint;
pub mod flow;
pub mod pkce;

use thiserror::Error;

/// Failure modes of the login flows. Validation failures
/// (`NoPendingSession`, `StateMismatch`) short-circuit before any call
/// to the token endpoint is made.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("no pending login for this session")]
    NoPendingSession,

    #[error("callback state did not match the pending login")]
    StateMismatch,

    #[error("network error talking to the remote service: {0}")]
    Network(#[from] reqwest::Error),

    #[error("remote service rejected the exchange: {status} => {body}")]
    ExchangeFailed { status: u16, body: String },

    #[error("malformed response from the remote service: {0}")]
    MalformedResponse(String),
}
