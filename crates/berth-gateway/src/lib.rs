//! Smart HTTP protocol gateway for Berth.
//!
//! Bridges inbound git client requests to a `git http-backend`
//! subprocess run as a CGI-style backend. Every request moves through a
//! fixed pipeline - VALIDATE, SPAWN, STREAM, FINALIZE - with typed
//! failures per stage, so the validation step cannot be bypassed and no
//! subprocess outlives its originating request.

mod cgi;
mod error;
mod gateway;
mod guard;
mod validate;

pub use cgi::{find_terminator, parse_headers, CgiResponse};
pub use error::GatewayError;
pub use gateway::{
    router, GatewayConfig, DEFAULT_FETCH_LIMIT, DEFAULT_PUSH_LIMIT, DEFAULT_TIMEOUT,
};
pub use guard::SizeGuard;
pub use validate::{validate_base_url, validate_repo_id, Operation, Service};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
