//! Request pipeline: request logging, identity, rate limiting, then
//! idempotency on mutating routes.

pub mod client_ip;
pub mod identity;
pub mod idempotency;
pub mod rate_limit;
pub mod request_logger;
