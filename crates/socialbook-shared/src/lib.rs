//! Types shared by the SocialBook store and server: entity identifiers,
//! retention constants and signed bearer tokens.

pub mod constants;
pub mod error;
pub mod session;
pub mod types;

pub use error::SessionError;
pub use session::{SessionKeys, SessionToken};
pub use types::*;
