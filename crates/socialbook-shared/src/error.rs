use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Session token expired")]
    Expired,

    #[error("Invalid session token signature")]
    BadSignature,

    #[error("Invalid signing key")]
    InvalidKey,
}
